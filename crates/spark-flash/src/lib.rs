//! spark-flash: 以客户端 Cookie 承载的一次性 Flash 消息与表单回填（old input）。
//!
//! # 教案式概览
//! - **意图（Why）**：在一次“提交 → 重定向 → 展示”的往返中传递提示消息与上一次的表单输入，
//!   且不依赖任何服务端会话存储。
//! - **结构（How）**：
//!   - [`key_path`]：分段键路径与前缀过滤；
//!   - [`form`]：表单与可序列化快照之间的可逆转换；
//!   - [`container`]：Cookie 中的序列化单元；
//!   - [`store`]：单请求的 current（只读）/ next（预写）双容器；
//!   - [`scope`]：把存储绑定到请求的逻辑调用链，并提供便捷函数；
//!   - [`middleware`]：面向 `tower` 的中间件，负责构造、自动续传与提交。
//! - **契约（What）**：损坏的 Cookie 静默回退为空状态；只有在请求作用域之外调用便捷函数才会返回
//!   [`FlashError::OutsideScope`]。
//! - **风险提示（Trade-offs）**：Cookie 内容为明文，客户端可读可改，不适合承载机密或需要防篡改的数据。

pub mod config;
pub mod container;
pub mod error;
pub mod form;
pub mod key_path;
pub mod middleware;
pub mod scope;
pub mod store;

pub use config::{FlashConfig, SameSitePolicy};
pub use container::{FlashContainer, FlashValue};
pub use error::FlashError;
pub use form::{FilePart, FormData, FormValue, SerializedForm};
pub use key_path::{Filter, KeyPath};
pub use middleware::{FlashLayer, FlashService};
pub use scope::RequestFlash;
pub use store::{FlashStore, ReflashOptions};
