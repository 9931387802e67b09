//! Subcommand implementations for the `bundle-loader` binary.

pub(crate) mod inspect;
pub(crate) mod load;
