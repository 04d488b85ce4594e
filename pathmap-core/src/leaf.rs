use serde::Serialize;
use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::sync::Arc;

use crate::codec::CodecError;

/// A value that can be stored at a leaf position of a [`PathMap`](crate::PathMap).
///
/// Leaves are type-erased and held behind `Arc<dyn Leaf>`. Every leaf can be:
/// - identified by its concrete type (codec dispatch goes through `TypeId`)
/// - cloned into a fresh allocation (deep copies)
/// - compared against another leaf of the same concrete type
/// - encoded into a generic CBOR value (the fallback codec)
///
/// This trait is implemented automatically for every
/// `Serialize + Clone + PartialEq + Debug + Send + Sync + 'static` type.
pub trait Leaf: Any + Debug + Send + Sync {
    /// Returns `self` as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns the `TypeId` of the concrete leaf type.
    fn leaf_type_id(&self) -> TypeId;

    /// Returns the name of the concrete leaf type.
    fn leaf_type_name(&self) -> &'static str;

    /// Clones the value into a new, unshared leaf.
    fn clone_leaf(&self) -> Arc<dyn Leaf>;

    /// Returns true if `other` has the same concrete type and compares equal.
    fn eq_leaf(&self, other: &dyn Leaf) -> bool;

    /// Converts the value into a generic CBOR value.
    fn to_cbor(&self) -> Result<ciborium::Value, CodecError>;
}

impl<T> Leaf for T
where
    T: Serialize + Clone + PartialEq + Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn leaf_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn leaf_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn clone_leaf(&self) -> Arc<dyn Leaf> {
        Arc::new(self.clone())
    }

    fn eq_leaf(&self, other: &dyn Leaf) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn to_cbor(&self) -> Result<ciborium::Value, CodecError> {
        ciborium::Value::serialized(self).map_err(|e| CodecError::Encode {
            type_name: std::any::type_name::<T>(),
            source: Box::new(e),
        })
    }
}

impl PartialEq for dyn Leaf {
    fn eq(&self, other: &Self) -> bool {
        self.eq_leaf(other)
    }
}

/// Downcasts a type-erased leaf to a concrete type.
pub fn downcast_leaf<T: Leaf>(leaf: &dyn Leaf) -> Option<&T> {
    leaf.as_any().downcast_ref::<T>()
}
