//! # Internal Macros
//!
//! This module provides internal macros for reducing boilerplate in chronodb.
//!
//! ## zerocopy_accessors!
//!
//! Generates getter and setter methods for zerocopy struct fields that use
//! little-endian wrapper types (I32, U32, U64, F32).
//!
//! ### Usage
//!
//! ```ignore
//! use zerocopy::little_endian::{I32, U64};
//!
//! #[repr(C)]
//! struct Header {
//!     page_id: I32,
//!     creation_version: U64,
//! }
//!
//! impl Header {
//!     zerocopy_accessors! {
//!         page_id: i32,
//!         creation_version: u64,
//!     }
//! }
//!
//! // Generates:
//! // pub fn page_id(&self) -> i32 { self.page_id.get() }
//! // pub fn set_page_id(&mut self, val: i32) { self.page_id = I32::new(val); }
//! // pub fn creation_version(&self) -> u64 { self.creation_version.get() }
//! // pub fn set_creation_version(&mut self, val: u64) { self.creation_version = U64::new(val); }
//! ```

/// Generates getter and setter methods for zerocopy little-endian fields.
#[macro_export]
macro_rules! zerocopy_accessors {
    (@impl $field:ident, i32) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> i32 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: i32) {
                self.$field = ::zerocopy::little_endian::I32::new(val);
            }
        }
    };
    (@impl $field:ident, u32) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u32 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u32) {
                self.$field = ::zerocopy::little_endian::U32::new(val);
            }
        }
    };
    (@impl $field:ident, u64) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u64 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u64) {
                self.$field = ::zerocopy::little_endian::U64::new(val);
            }
        }
    };
    (@impl $field:ident, f32) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> f32 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: f32) {
                self.$field = ::zerocopy::little_endian::F32::new(val);
            }
        }
    };
    ($($field:ident : $ty:tt),* $(,)?) => {
        $(
            $crate::zerocopy_accessors!(@impl $field, $ty);
        )*
    };
}
