mod remote_store;

pub use remote_store::{
    MemoryBackend, RemoteStore, RowIter, TurbopufferBackend, create_backend,
};

#[cfg(test)]
pub(crate) use remote_store::testing;
