//! Wire protocol kernels, one module per supported command station family.

pub mod diy;
