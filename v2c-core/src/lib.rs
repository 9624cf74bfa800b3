pub use anyhow::{anyhow, Context as ErrContext, Error, Result};

#[macro_export]
macro_rules! err {
    ($it:ident) => {
       Err($crate::Error::msg($it))
    };
    ($lit:literal) => {
        Err($crate::Error::msg($lit))
    };
    ($($tt:tt)*) => {
        Err($crate::Error::msg(format!($($tt)*)))
    };
}

pub mod archive;
pub mod build;
pub mod cancel;
pub mod component;
pub mod registry;
pub mod runtime;
pub mod stream;
pub mod volume;
