use crate::option::CompileOptions;
use crate::utils::pprint::PrettyPrint;

use std::time;

pub struct DebugEnv {
    debug_print: bool,
    debug_perf: bool,
    start: time::Instant,
    pass_start: time::Instant
}

impl DebugEnv {
    pub fn new(opts: &CompileOptions) -> DebugEnv {
        DebugEnv {
            debug_print: opts.debug_print,
            debug_perf: opts.debug_perf,
            start: time::Instant::now(),
            pass_start: time::Instant::now()
        }
    }

    fn elapsed_us(start: time::Instant) -> u128 {
        time::Instant::now().duration_since(start).as_micros()
    }

    fn print_ast_message<T: PrettyPrint>(
        start: time::Instant,
        bounds: &str,
        msg: &str,
        ast: &T
    ) -> String {
        let t = DebugEnv::elapsed_us(start);
        format!("{0} {msg} (time: {1} us) {0}\n{2}", bounds, t, ast.pprint_default())
    }

    fn perf_message(start: time::Instant, pass: &str) -> String {
        format!("{pass}: {0} us", DebugEnv::elapsed_us(start))
    }

    pub fn print<T: PrettyPrint>(&self, msg: &str, ast: &T) {
        if self.debug_print {
            let bounds = "=".repeat(5);
            println!("{}", DebugEnv::print_ast_message(self.start, &bounds, msg, ast));
        }
    }

    pub fn print_text(&self, msg: &str, text: &str) {
        if self.debug_print {
            let bounds = "=".repeat(5);
            println!("{bounds} {msg} {bounds}\n{text}");
        }
    }

    // Reports the time spent since the previous report, or since the start of compilation for the
    // first pass.
    pub fn report_time(&mut self, pass: &str) {
        if self.debug_perf {
            println!("{}", DebugEnv::perf_message(self.pass_start, pass));
        }
        self.pass_start = time::Instant::now();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::name::Name;

    use regex::Regex;

    #[test]
    fn test_print_message() {
        let start = time::Instant::now();
        let ast = Name::new("x".to_string());
        let s = DebugEnv::print_ast_message(start, "=", "graph", &ast);
        let re = Regex::new(r"^= graph \(time: \d+ us\) =\nx$").unwrap();
        assert!(re.is_match(&s));
    }

    #[test]
    fn test_perf_message() {
        let s = DebugEnv::perf_message(time::Instant::now(), "builder");
        let re = Regex::new(r"^builder: \d+ us$").unwrap();
        assert!(re.is_match(&s));
    }

    #[test]
    fn report_time_restarts_pass_timer() {
        let mut env = DebugEnv::new(&CompileOptions::default());
        let first = env.pass_start;
        std::thread::sleep(time::Duration::from_millis(2));
        env.report_time("builder");
        assert!(env.pass_start > first);
        assert!(env.pass_start.duration_since(env.start).as_millis() >= 2);
    }
}
