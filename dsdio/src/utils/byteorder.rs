//! Byte-order aware serialization of fixed chunk records.
//!
//! DSDIFF records are big-endian, DSF records little-endian. Records derive
//! [`ToBytes`](dsdio_macros::ToBytes) and get both orders for free.

pub trait WriteBytesLe {
    fn write_le(&self, dst: &mut Vec<u8>);
}

pub trait WriteBytesBe {
    fn write_be(&self, dst: &mut Vec<u8>);
}

macro_rules! impl_num_le_be {
    ($($t:ty),+) => { $(
        impl WriteBytesLe for $t { #[inline] fn write_le(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_le_bytes()); }}
        impl WriteBytesBe for $t { #[inline] fn write_be(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_be_bytes()); }}
    )+ }
}

impl_num_le_be!(u8, i8, u16, i16, u32, i32, u64, i64);

#[macro_export]
macro_rules! impl_collection {
    ($trait:ident, $method:ident) => {
        impl<T: $trait> $trait for Vec<T> {
            #[inline]
            fn $method(&self, dst: &mut Vec<u8>) {
                self.iter().for_each(|item| item.$method(dst));
            }
        }
        impl<T: $trait, const N: usize> $trait for [T; N] {
            #[inline]
            fn $method(&self, dst: &mut Vec<u8>) {
                self.iter().for_each(|item| item.$method(dst));
            }
        }
    };
}

impl_collection!(WriteBytesLe, write_le);
impl_collection!(WriteBytesBe, write_be);

/// Implements both byte orders for a fieldless `#[repr($repr)]` enum.
#[macro_export]
macro_rules! impl_repr_enum {
    ($t:ty, $repr:ty) => {
        impl $crate::utils::byteorder::WriteBytesLe for $t {
            fn write_le(&self, dst: &mut Vec<u8>) {
                dst.extend_from_slice(&(*self as $repr).to_le_bytes())
            }
        }
        impl $crate::utils::byteorder::WriteBytesBe for $t {
            fn write_be(&self, dst: &mut Vec<u8>) {
                dst.extend_from_slice(&(*self as $repr).to_be_bytes())
            }
        }
    };
}

#[macro_export]
macro_rules! join_bytes_be {
    ( $($value:expr),+ $(,)? ) => {{
        #[allow(unused_imports)]
        use $crate::utils::byteorder::WriteBytesBe as _;
        let mut vec = Vec::<u8>::new();
        $( $value.write_be(&mut vec); )+
        vec
    }};
}
