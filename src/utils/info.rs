use itertools::Itertools;

use std::fs;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilePos {
    pub line: usize,
    pub col: usize
}

impl FilePos {
    pub fn new(line: usize, col: usize) -> FilePos {
        FilePos {line, col}
    }

    pub fn with_line_offset(self, ofs: usize) -> FilePos {
        FilePos {line: self.line + ofs, col: self.col}
    }

    pub fn with_column_offset(self, ofs: usize) -> FilePos {
        FilePos {line: self.line, col: self.col + ofs}
    }
}

// Refers back to the region of the kernel source file an AST node was converted from. Nodes
// constructed without a source (e.g. in tests) use the default value, which has an empty
// filename and is never resolved against the file system.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Info {
    filename: String,
    start: FilePos,
    end: FilePos
}

impl Info {
    pub fn new(fname: &str, start: FilePos, end: FilePos) -> Info {
        Info {filename: fname.to_string(), start, end}
    }

    pub fn with_file(self, fname: &str) -> Info {
        Info {filename: fname.to_string(), ..self}
    }

    pub fn with_line_offset(self, ofs: usize) -> Info {
        let start = self.start.with_line_offset(ofs);
        let end = self.end.with_line_offset(ofs);
        Info {start, end, ..self}
    }

    pub fn with_column_offset(self, ofs: usize) -> Info {
        let start = self.start.with_column_offset(ofs);
        let end = self.end.with_column_offset(ofs);
        Info {start, end, ..self}
    }

    pub fn error_msg(&self, msg: String) -> String {
        if self.filename.is_empty() || self.start.line == 0 {
            return msg;
        }
        match fs::read_to_string(&self.filename) {
            Ok(code) => self.extract_lines(code, msg),
            Err(_) => format!("{msg}\n\nOn line {0} of file {1}", self.start.line, self.filename)
        }
    }

    fn extract_lines(&self, code: String, msg: String) -> String {
        let FilePos {line: l1, col: c1} = self.start;
        let FilePos {line: l2, col: c2} = self.end;
        let last = l2.max(l1);
        let select_lines = code.lines()
            .skip(l1 - 1)
            .take(last - l1 + 1)
            .join("\n");
        let markers = format!("{0}{1}", " ".repeat(c1.min(c2)), "^".repeat(c1.abs_diff(c2).max(1)));
        let lines_msg = if l1 == last {
            format!("line {l1}")
        } else {
            format!("lines {l1}-{last}")
        };
        format!(
            "{msg}\n\nOn {lines_msg} of file {0}:\n{select_lines}\n{markers}\n",
            self.filename
        )
    }
}

pub trait InfoNode {
    fn get_info(&self) -> Info;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_info_keeps_message() {
        let msg = Info::default().error_msg("oops".to_string());
        assert_eq!(msg, "oops");
    }

    #[test]
    fn missing_file_reports_line() {
        let i = Info::new("/nonexistent/kernel.py", FilePos::new(3, 4), FilePos::new(3, 9));
        let msg = i.error_msg("bad".to_string());
        assert!(msg.starts_with("bad"));
        assert!(msg.contains("line 3"));
    }

    #[test]
    fn offsets_shift_both_ends() {
        let i = Info::new("f.py", FilePos::new(1, 2), FilePos::new(2, 5))
            .with_line_offset(10)
            .with_column_offset(4);
        assert_eq!(i, Info::new("f.py", FilePos::new(11, 6), FilePos::new(12, 9)));
    }
}
