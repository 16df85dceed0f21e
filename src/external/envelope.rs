use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 促销后台统一响应包装
#[derive(Debug, Serialize, Deserialize)]
pub struct RemoteEnvelope<T> {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    pub success: bool,
}

impl<T> RemoteEnvelope<T> {
    /// 取出 data；success=false 或 data 为空都视为远端错误
    pub fn into_data(self, what: &str) -> AppResult<T> {
        if !self.success {
            return Err(AppError::RemoteError(format!(
                "{what} failed: [{}] {}",
                self.code, self.message
            )));
        }
        self.data
            .ok_or_else(|| AppError::RemoteError(format!("{what} returned no data")))
    }
}
