use crate::utils::name::Name;

use itertools::Itertools;
use rand::distributions::{Alphanumeric, DistString};

use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_INDENT: usize = 2;

#[derive(Debug)]
pub struct PrettyPrintEnv {
    strs: BTreeSet<String>,
    vars: BTreeMap<Name, String>,
    indent: usize,
    indent_increment: usize,
}

impl PrettyPrintEnv {
    pub fn new() -> Self {
        PrettyPrintEnv {
            strs: BTreeSet::new(),
            vars: BTreeMap::new(),
            indent: 0,
            indent_increment: DEFAULT_INDENT,
        }
    }

    pub fn incr_indent(self) -> Self {
        let indent = self.indent + self.indent_increment;
        PrettyPrintEnv {indent, ..self}
    }

    pub fn decr_indent(self) -> Self {
        let indent = self.indent.saturating_sub(self.indent_increment);
        PrettyPrintEnv {indent, ..self}
    }

    pub fn print_indent(&self) -> String {
        " ".repeat(self.indent)
    }
}

impl Default for PrettyPrintEnv {
    fn default() -> Self {
        PrettyPrintEnv::new()
    }
}

pub trait PrettyPrint {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String);

    fn pprint_default(&self) -> String {
        let (_, s) = self.pprint(PrettyPrintEnv::new());
        s
    }
}

fn rand_alphanum(n: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), n)
}

fn alloc_free_string(mut env: PrettyPrintEnv, id: &Name) -> (PrettyPrintEnv, String) {
    let mut s = id.get_str().clone();
    if env.strs.contains(&s) {
        s = id.print_with_sym();
        while env.strs.contains(&s) {
            s = format!("{0}_{1}", id.get_str(), rand_alphanum(5));
        }
    };
    env.strs.insert(s.clone());
    env.vars.insert(id.clone(), s.clone());
    (env, s)
}

// Names are printed using their plain string when it is not yet taken by another name. A name
// always prints the same way within one environment.
impl PrettyPrint for Name {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        if let Some(s) = env.vars.get(self) {
            let s = s.clone();
            (env, s)
        } else {
            alloc_free_string(env, self)
        }
    }
}

impl<T: PrettyPrint> PrettyPrint for Vec<T> {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        pprint_iter(self.iter(), env, "\n")
    }
}

pub fn pprint_iter<'a, T: PrettyPrint + 'a, I: Iterator<Item=&'a T>>(
    it: I,
    env: PrettyPrintEnv,
    separator: &str
) -> (PrettyPrintEnv, String) {
    let (env, strs) = it.fold((env, vec![]), |(env, mut strs), v| {
            let (env, v) = v.pprint(env);
            strs.push(v);
            (env, strs)
        });
    (env, strs.into_iter().join(separator))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_distinct_names_print() {
        let n1 = Name::sym_str("x");
        let n2 = n1.clone().with_new_sym();
        assert!(n1 != n2);
        let env = PrettyPrintEnv::new();
        let (env, s1) = n1.pprint(env);
        let (env, s2) = n2.pprint(env);
        assert_eq!(env.strs.len(), 2);
        assert!(s1 != s2);
    }

    #[test]
    fn test_same_name_prints_consistently() {
        let n = Name::sym_str("y");
        let (env, s1) = n.pprint(PrettyPrintEnv::new());
        let (_, s2) = n.pprint(env);
        assert_eq!(s1, s2);
        assert_eq!(s1, "y");
    }

    #[test]
    fn test_indentation() {
        let env = PrettyPrintEnv::new().incr_indent().incr_indent();
        assert_eq!(env.print_indent(), "    ");
        let env = env.decr_indent().decr_indent().decr_indent();
        assert_eq!(env.print_indent(), "");
    }
}
