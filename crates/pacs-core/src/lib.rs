//! # PACS Core
//!
//! 检查到达监控系统的核心模块，提供共享数据结构、错误定义和通用工具。

pub mod error;
pub mod models;
pub mod utils;

pub use error::{PacsError, Result};
pub use models::*;
