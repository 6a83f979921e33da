//! Read and write pumps shared by the transports.

pub(crate) mod read;
pub(crate) mod write;
