//! 시장 데이터와 지갑 이동 도메인 모델.

mod market;
mod venue;
mod wallet;

pub use market::*;
pub use venue::*;
pub use wallet::*;
