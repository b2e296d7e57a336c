//! Parameter type tags
//!
//! Each host parameter type maps to one character of the VM's parameter check
//! mask. Types missing from the registry get the wildcard `.`, which the VM accepts
//! for any value.

use crate::convert::Null;
use crate::types::{Array, Class, Function, Instance, Table};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::any::TypeId;

/// Tag accepted for any value
pub const WILDCARD: char = '.';

static TAGS: Lazy<FxHashMap<TypeId, char>> = Lazy::new(|| {
    let mut tags = FxHashMap::default();

    for id in [
        TypeId::of::<i8>(),
        TypeId::of::<i16>(),
        TypeId::of::<i32>(),
        TypeId::of::<i64>(),
        TypeId::of::<isize>(),
        TypeId::of::<u8>(),
        TypeId::of::<u16>(),
        TypeId::of::<u32>(),
        TypeId::of::<u64>(),
        TypeId::of::<usize>(),
    ] {
        tags.insert(id, 'i');
    }
    tags.insert(TypeId::of::<f32>(), 'f');
    tags.insert(TypeId::of::<f64>(), 'f');
    tags.insert(TypeId::of::<String>(), 's');
    tags.insert(TypeId::of::<Table>(), 't');
    tags.insert(TypeId::of::<Array>(), 'a');
    tags.insert(TypeId::of::<Class>(), 'y');
    tags.insert(TypeId::of::<Function>(), 'c');
    tags.insert(TypeId::of::<Instance>(), 'x');
    tags.insert(TypeId::of::<Null>(), 'o');

    tags
});

/// Mask character for parameters of type `T`
pub fn param_tag<T: 'static>() -> char {
    TAGS.get(&TypeId::of::<T>()).copied().unwrap_or(WILDCARD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;

    #[test]
    fn test_primitive_tags() {
        assert_eq!(param_tag::<i32>(), 'i');
        assert_eq!(param_tag::<u64>(), 'i');
        assert_eq!(param_tag::<f64>(), 'f');
        assert_eq!(param_tag::<String>(), 's');
        assert_eq!(param_tag::<Null>(), 'o');
    }

    #[test]
    fn test_view_tags() {
        assert_eq!(param_tag::<Table>(), 't');
        assert_eq!(param_tag::<Array>(), 'a');
        assert_eq!(param_tag::<Class>(), 'y');
        assert_eq!(param_tag::<Function>(), 'c');
        assert_eq!(param_tag::<Instance>(), 'x');
    }

    #[test]
    fn test_unregistered_types_are_wildcards() {
        struct Host;
        assert_eq!(param_tag::<bool>(), WILDCARD);
        assert_eq!(param_tag::<Object>(), WILDCARD);
        assert_eq!(param_tag::<Option<i64>>(), WILDCARD);
        assert_eq!(param_tag::<Host>(), WILDCARD);
    }
}
