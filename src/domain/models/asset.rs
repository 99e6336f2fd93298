// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 图片在商品中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AssetRole {
    /// 主图，固定位置 0
    Hero,
    /// 画廊图，位置从 1 开始
    Gallery,
    /// A+ 详情图
    Aplus,
}

impl AssetRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetRole::Hero => "hero",
            AssetRole::Gallery => "gallery",
            AssetRole::Aplus => "aplus",
        }
    }
}

impl fmt::Display for AssetRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hero" => Ok(AssetRole::Hero),
            "gallery" => Ok(AssetRole::Gallery),
            "aplus" => Ok(AssetRole::Aplus),
            _ => Err(()),
        }
    }
}

/// 镜像状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    #[default]
    Pending,
    /// 已上传并确认，`storage_path` 有效
    Stored,
    Failed,
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AssetStatus::Pending => write!(f, "pending"),
            AssetStatus::Stored => write!(f, "stored"),
            AssetStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for AssetStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AssetStatus::Pending),
            "stored" => Ok(AssetStatus::Stored),
            "failed" => Ok(AssetStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 单个图片资源描述
///
/// 由 (role, position) 在所属商品内唯一寻址；`storage_path`
/// 只在上传确认成功后才会被写入。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub role: AssetRole,
    pub position: i32,
    pub source_url: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub alt_text: Option<String>,
    pub storage_path: Option<String>,
    pub status: AssetStatus,
}

impl AssetRecord {
    pub fn pending(role: AssetRole, position: i32, source_url: impl Into<String>) -> Self {
        Self {
            role,
            position,
            source_url: source_url.into(),
            width: None,
            height: None,
            alt_text: None,
            storage_path: None,
            status: AssetStatus::Pending,
        }
    }
}
