//! # LIMS Core
//!
//! 实验室订单系统的核心模块，提供基础数据结构、错误定义和通用工具。

pub mod error;
pub mod models;
pub mod notify;
pub mod utils;

pub use error::{LimsError, Result};
pub use models::*;
pub use notify::{MutationNotifier, NoopNotifier};
