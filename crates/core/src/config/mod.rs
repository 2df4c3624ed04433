//! 配置管理
//!
//! 配置按组件分节，加载顺序：结构体默认值 -> TOML 配置文件 -> `ALERTING_` 前缀的环境变量。

pub mod models;

pub use models::*;
