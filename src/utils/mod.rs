pub mod ast;
pub mod debug;
pub mod err;
pub mod info;
pub mod name;
pub mod pprint;
pub mod reduce;
