//! Configuration access port.
//!
//! Values come back as raw text; the domain decides how strictly to parse
//! them.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
}
