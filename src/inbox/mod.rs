//! 命令收件箱：基于目录列表的文件队列

pub mod scanner;

pub use scanner::{scan, ProcessedSet, DESCRIPTOR_EXTENSION};
