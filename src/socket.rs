//! Guest socket descriptor table.
//!
//! Grounded on `include/arion/common/socket_manager.hpp`'s `ARION_SOCKET`/
//! `SocketManager`. Shares the guest fd namespace with
//! [`crate::fs::FileSystemManager`] — the two tables are disjoint subsets of
//! one allocator, enforced by the fd allocator living on the owning guest
//! rather than in either table.

use crate::error::{ArionResult, FsError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArionSocket {
    pub fd: i32,
    pub family: i32,
    pub sock_type: i32,
    pub protocol: i32,
    pub ip: String,
    pub port: u16,
    pub path: String,
    pub server: bool,
    pub server_listen: bool,
    pub server_backlog: i32,
    pub blocking: bool,
    pub addr_bytes: Vec<u8>,
}

impl ArionSocket {
    pub fn new(fd: i32, family: i32, sock_type: i32, protocol: i32) -> Self {
        Self {
            fd,
            family,
            sock_type,
            protocol,
            ..Default::default()
        }
    }
}

#[derive(Default, Clone)]
pub struct SocketManager {
    pub sockets: HashMap<i32, ArionSocket>,
}

impl SocketManager {
    pub fn initialize() -> Self {
        Self::default()
    }

    pub fn add_socket_entry(&mut self, target_fd: i32, socket: ArionSocket) {
        self.sockets.insert(target_fd, socket);
    }

    pub fn has_socket_entry(&self, target_fd: i32) -> bool {
        self.sockets.contains_key(&target_fd)
    }

    pub fn rm_socket_entry(&mut self, target_fd: i32) {
        self.sockets.remove(&target_fd);
    }

    pub fn get_arion_socket(&self, target_fd: i32) -> ArionResult<&ArionSocket> {
        self.sockets.get(&target_fd).ok_or(FsError::NoSuchFd(target_fd).into())
    }

    pub fn get_arion_socket_mut(&mut self, target_fd: i32) -> ArionResult<&mut ArionSocket> {
        self.sockets.get_mut(&target_fd).ok_or(FsError::NoSuchFd(target_fd).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_socket_entry() {
        let mut sm = SocketManager::initialize();
        sm.add_socket_entry(3, ArionSocket::new(3, libc::AF_INET, libc::SOCK_STREAM, 0));
        assert!(sm.has_socket_entry(3));
        assert_eq!(sm.get_arion_socket(3).unwrap().family, libc::AF_INET);
        sm.rm_socket_entry(3);
        assert!(!sm.has_socket_entry(3));
    }
}
