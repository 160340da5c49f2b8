//! String-keyed, type-erased values shared between the handlers of one request.

use std::{any::Any, collections::HashMap};

/// A bag of per-request values.
///
/// Pre-processors typically store something (a user id, a start time) that the
/// service handler or a post-processor reads back by key and type.
///
/// # Examples
///
/// ```
/// use waygate::context::Values;
///
/// let mut values = Values::new();
/// values.set("user_id", 42_u64);
///
/// assert_eq!(values.get::<u64>("user_id"), Some(&42));
/// assert_eq!(values.get::<String>("user_id"), None);
/// ```
#[derive(Default)]
pub struct Values {
    map: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing whatever was there.
    pub fn set<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(key.into(), Box::new(value));
    }

    /// Returns the value under `key` if it exists and has type `T`.
    pub fn get<T>(&self, key: &str) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self, key: &str) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(key)
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Takes the value under `key` out of the bag.
    ///
    /// A value of a different type stays where it is and `None` is returned.
    pub fn remove<T>(&mut self, key: &str) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        if !self.map.get(key)?.is::<T>() {
            return None;
        }
        self.map
            .remove(key)
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for Values {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_previous_value() {
        let mut values = Values::new();
        values.set("k", 1_i32);
        values.set("k", "two");
        assert_eq!(values.get::<i32>("k"), None);
        assert_eq!(values.get::<&str>("k"), Some(&"two"));
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut values = Values::new();
        values.set("hits", 1_u32);
        *values.get_mut::<u32>("hits").unwrap() += 1;
        assert_eq!(values.get::<u32>("hits"), Some(&2));
    }

    #[test]
    fn remove_with_wrong_type_keeps_value() {
        let mut values = Values::new();
        values.set("name", String::from("gate"));
        assert_eq!(values.remove::<u8>("name"), None);
        assert!(values.contains("name"));
        assert_eq!(values.remove::<String>("name"), Some("gate".to_owned()));
        assert!(values.is_empty());
    }
}
