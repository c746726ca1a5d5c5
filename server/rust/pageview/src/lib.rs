//! pageview-server: 合成ページビューを定期生成して Kafka へ発行し、
//! 同じトピックを購読してログに記録するサービス。

pub mod adapter;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod usecase;
