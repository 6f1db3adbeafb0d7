use std::sync::atomic;
use std::cmp;
use std::fmt;
use std::hash;

pub type Sym = i64;

static COUNTER: atomic::AtomicI64 = atomic::AtomicI64::new(0);

fn gensym() -> Sym {
    COUNTER.fetch_add(1, atomic::Ordering::Relaxed)
}

// A source-level identifier optionally paired with a symbol distinguishing it from other
// identifiers sharing the same string. Two names with symbols are equal only if their symbols
// are equal.
#[derive(Clone, Debug)]
pub struct Name {
    s: String,
    sym: Option<Sym>
}

impl Name {
    pub fn new(s: String) -> Name {
        Name {s, sym: None}
    }

    pub fn sym_str(s: &str) -> Name {
        Name::new(s.to_string()).with_new_sym()
    }

    pub fn with_new_sym(self) -> Name {
        Name {sym: Some(gensym()), ..self}
    }

    pub fn with_sym(self, sym: Sym) -> Name {
        Name {sym: Some(sym), ..self}
    }

    pub fn has_sym(&self) -> bool {
        self.sym.is_some()
    }

    pub fn get_str(&self) -> &String {
        &self.s
    }

    pub fn print_with_sym(&self) -> String {
        if let Some(sym) = self.sym {
            format!("{0}_{1}", self.s, sym)
        } else {
            self.s.clone()
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{0}", self.s)
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        match (self.sym, other.sym) {
            (Some(l), Some(r)) => l.cmp(&r),
            (Some(_), None) => cmp::Ordering::Greater,
            (None, Some(_)) => cmp::Ordering::Less,
            (None, None) => self.s.cmp(&other.s),
        }
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == cmp::Ordering::Equal
    }
}

impl Eq for Name {}

impl hash::Hash for Name {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        match self.sym {
            Some(sym) => sym.hash(state),
            None => self.s.hash(state)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_symbols_distinguish_names() {
        let x = Name::sym_str("x");
        let y = x.clone().with_new_sym();
        assert_ne!(x, y);
        assert_eq!(x.get_str(), y.get_str());
    }

    #[test]
    fn explicit_symbol_printed_as_suffix() {
        let x = Name::new("acc".to_string()).with_sym(7);
        assert_eq!(x.print_with_sym(), "acc_7");
        assert_eq!(x.to_string(), "acc");
    }
}
