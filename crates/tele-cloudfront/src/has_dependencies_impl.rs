//! Implementations of HasDependencies for primitives and collections.

use crate::{Dependencies, HasDependencies};

macro_rules! go {
    ($($type: ty),+ $(,)?) => {
        $(impl HasDependencies for $type {})+
    };
}

go!(String, u8, i8, u16, i16, u32, i32, u64, i64, f32, f64, bool);

impl<T: HasDependencies> HasDependencies for Vec<T> {
    fn dependencies(&self) -> Dependencies {
        self.iter().fold(Dependencies::default(), |acc, item| {
            acc.merge(item.dependencies())
        })
    }
}

impl<K, V: HasDependencies> HasDependencies for std::collections::BTreeMap<K, V> {
    fn dependencies(&self) -> Dependencies {
        self.values().fold(Dependencies::default(), |acc, item| {
            acc.merge(item.dependencies())
        })
    }
}

impl<V: HasDependencies> HasDependencies for std::collections::BTreeSet<V> {
    fn dependencies(&self) -> Dependencies {
        self.iter().fold(Dependencies::default(), |acc, item| {
            acc.merge(item.dependencies())
        })
    }
}

impl<V: HasDependencies> HasDependencies for Option<V> {
    fn dependencies(&self) -> Dependencies {
        self.iter().fold(Dependencies::default(), |acc, item| {
            acc.merge(item.dependencies())
        })
    }
}
