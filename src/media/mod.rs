pub(crate) mod pixel;
pub(crate) mod pool;
pub(crate) mod transfer;
