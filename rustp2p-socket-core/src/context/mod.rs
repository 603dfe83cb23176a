//! Where a socket factory gets its raw sockets from.
//!
//! A factory is either bound to the thread that created it, in which case it
//! uses the provider installed for that thread, or it carries an explicit
//! provider and can be used from anywhere.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::error::{Error, Result};
use crate::socket::{SocketProvider, SystemSocketProvider};

thread_local! {
    static THREAD_PROVIDER: RefCell<Option<Arc<dyn SocketProvider>>> = const { RefCell::new(None) };
}

/// Install the socket provider of the current thread, returning the previous one.
pub fn set_thread_provider(
    provider: Arc<dyn SocketProvider>,
) -> Option<Arc<dyn SocketProvider>> {
    THREAD_PROVIDER.with(|cell| cell.borrow_mut().replace(provider))
}

/// Remove the provider of the current thread.
pub fn clear_thread_provider() -> Option<Arc<dyn SocketProvider>> {
    THREAD_PROVIDER.with(|cell| cell.borrow_mut().take())
}

/// The provider of the current thread, the system provider if none is installed.
pub fn thread_provider() -> Arc<dyn SocketProvider> {
    THREAD_PROVIDER.with(|cell| {
        cell.borrow()
            .clone()
            .unwrap_or_else(|| Arc::new(SystemSocketProvider::new()))
    })
}

#[derive(Clone)]
pub enum SocketContext {
    /// Bound to an owning thread; every use must happen on it.
    Thread(ThreadId),
    Provider(Arc<dyn SocketProvider>),
}

impl SocketContext {
    pub fn current_thread() -> Self {
        SocketContext::Thread(thread::current().id())
    }
    pub fn with_provider(provider: Arc<dyn SocketProvider>) -> Self {
        SocketContext::Provider(provider)
    }
    /// Resolve the provider for this call, checking the calling thread.
    pub fn provider(&self) -> Result<Arc<dyn SocketProvider>> {
        match self {
            SocketContext::Thread(owner) => {
                if *owner != thread::current().id() {
                    return Err(Error::WrongThread);
                }
                Ok(thread_provider())
            }
            SocketContext::Provider(provider) => Ok(provider.clone()),
        }
    }
}
