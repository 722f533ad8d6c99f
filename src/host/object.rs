//! Objects with ordered own properties

use super::HostValue;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A shared, mutable property bag. Clones refer to the same object.
#[derive(Clone, Default)]
pub struct HostObject {
    properties: Rc<RefCell<Vec<(String, HostValue)>>>,
}

impl HostObject {
    pub fn new() -> HostObject {
        HostObject::default()
    }

    pub fn get(&self, name: &str) -> Option<HostValue> {
        self.properties
            .borrow()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    /// Defines `name`, replacing an existing property in place.
    pub fn set(&self, name: &str, value: HostValue) {
        let mut properties = self.properties.borrow_mut();
        match properties.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => properties.push((name.to_string(), value)),
        }
    }

    /// Defines `name` only if it is not already present.
    pub fn set_if_absent(&self, name: &str, value: HostValue) -> bool {
        if self.has(name) {
            return false;
        }
        self.properties.borrow_mut().push((name.to_string(), value));
        true
    }

    pub fn has(&self, name: &str) -> bool {
        self.properties.borrow().iter().any(|(key, _)| key == name)
    }

    /// Property names in definition order.
    pub fn keys(&self) -> Vec<String> {
        self.properties.borrow().iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.properties.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.properties, &other.properties)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_keep_order() {
        let object = HostObject::new();
        object.set("b", HostValue::Smi(1));
        object.set("a", HostValue::Smi(2));
        object.set("b", HostValue::Smi(3));
        assert_eq!(object.keys(), vec!["b", "a"]);
        assert_eq!(object.get("b"), Some(HostValue::Smi(3)));
        assert_eq!(object.get("c"), None);
    }

    #[test]
    fn test_set_if_absent_keeps_first() {
        let object = HostObject::new();
        assert!(object.set_if_absent("f", HostValue::Smi(1)));
        assert!(!object.set_if_absent("f", HostValue::Smi(2)));
        assert_eq!(object.get("f"), Some(HostValue::Smi(1)));
        assert_eq!(object.len(), 1);
    }

    #[test]
    fn test_clones_share_properties() {
        let object = HostObject::new();
        let alias = object.clone();
        alias.set("x", HostValue::Null);
        assert!(object.has("x"));
        assert!(object.ptr_eq(&alias));
        assert!(!object.ptr_eq(&HostObject::new()));
    }
}
