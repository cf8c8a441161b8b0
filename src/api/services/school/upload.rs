//! multipart 上传解析

use std::collections::HashMap;

use actix_multipart::Multipart;
use futures_util::StreamExt;
use tracing::{debug, error};

use crate::config::get_config;
use crate::errors::SchoolError;

/// 一次上传：文件内容与其余表单字段
#[derive(Debug, Default)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub fields: HashMap<String, String>,
}

impl Upload {
    /// 读取整数表单字段
    pub fn int_field(&self, name: &str) -> Result<i32, SchoolError> {
        let raw = self
            .fields
            .get(name)
            .ok_or_else(|| SchoolError::validation(format!("Field '{}' is required", name)))?;
        raw.trim()
            .parse()
            .map_err(|_| SchoolError::validation(format!("Field '{}' must be a number", name)))
    }
}

/// 读取 multipart 表单；`file` 字段为文件，其余字段按文本收集
pub async fn read_upload(mut payload: Multipart) -> Result<Upload, SchoolError> {
    let max_bytes = get_config().import.max_file_size_mb * 1024 * 1024;
    let mut upload = Upload::default();
    let mut has_file = false;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| {
            error!("Failed to parse multipart field: {}", e);
            SchoolError::import(format!("Invalid multipart data: {}", e))
        })?;
        let name = field.name().unwrap_or("").to_string();

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let bytes = chunk.map_err(|e| SchoolError::file_operation(format!("Failed to read upload: {}", e)))?;
            if data.len() + bytes.len() > max_bytes {
                return Err(SchoolError::import(format!(
                    "File size exceeds maximum {} MB",
                    max_bytes / 1024 / 1024
                )));
            }
            data.extend_from_slice(&bytes);
        }

        if name == "file" {
            upload.filename = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .unwrap_or("upload.csv")
                .to_string();
            upload.bytes = data;
            has_file = true;
        } else {
            upload
                .fields
                .insert(name, String::from_utf8_lossy(&data).trim().to_string());
        }
    }

    if !has_file || upload.bytes.is_empty() {
        return Err(SchoolError::import("No file provided"));
    }
    debug!(
        "Received upload '{}' ({} bytes)",
        upload.filename,
        upload.bytes.len()
    );
    Ok(upload)
}
