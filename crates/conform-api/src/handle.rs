// SPDX-License-Identifier: CEPL-1.0
use std::fmt;

/// Object type tag scoping a raw handle value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    Instance,
    Session,
    Swapchain,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectType::Instance => "instance",
            ObjectType::Session => "session",
            ObjectType::Swapchain => "swapchain",
        })
    }
}

pub trait ObjectHandle: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    const OBJECT_TYPE: ObjectType;

    fn from_raw(raw: u64) -> Self;
    fn as_raw(self) -> u64;
}

macro_rules! define_handle {
    ($name:ident, $ty:ident) => {
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl ObjectHandle for $name {
            const OBJECT_TYPE: ObjectType = ObjectType::$ty;

            fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            fn as_raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "(0x{:x})"), self.0)
            }
        }
    };
}

define_handle!(Instance, Instance);
define_handle!(Session, Session);
define_handle!(Swapchain, Swapchain);
