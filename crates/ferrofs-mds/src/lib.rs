#![warn(missing_docs)]

//! FerroFS metadata server subsystems: the durable open file table.
//!
//! The open file table records which inodes currently carry client state on
//! this metadata server rank, persisting just enough breadcrumbs (parent
//! directory and entry name per inode) that a recovering rank can rebuild a
//! path to every open inode without scanning the hierarchy.

pub mod anchor;
pub mod cache;
pub mod inode;
pub mod objecter;
pub mod openfiles;
pub mod types;
