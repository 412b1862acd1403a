//! 派对与好友关系的核心领域模型
//!
//! 包含用户社交档案、派对状态机、实时事件词汇，以及相关的业务规则。

pub mod errors;
pub mod events;
pub mod party;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use party::*;
pub use user::*;
pub use value_objects::*;
