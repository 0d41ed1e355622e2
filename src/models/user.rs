//! 用户、教师与学生

use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::error::BusinessError;

/// 角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Admin,
    /// 学生端使用者
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 身份（由外部认证服务提供）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub school: Option<String>,
    /// teacher 或 admin
    #[serde(default = "default_teacher_role")]
    pub role: Role,
}

fn default_teacher_role() -> Role {
    Role::Teacher
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub teacher_id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// 待插入的学生行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewStudent {
    pub teacher_id: i64,
    pub first_name: String,
    pub last_name: String,
}

impl NewStudent {
    /// 去掉首尾空白，姓或名为空时拒绝
    pub fn new(
        teacher_id: i64,
        first_name: &str,
        last_name: &str,
    ) -> Result<Self, BusinessError> {
        let first_name = first_name.trim();
        let last_name = last_name.trim();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(BusinessError::EmptyStudentName);
        }
        Ok(Self {
            teacher_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_student_trims_and_rejects_blank() {
        let s = NewStudent::new(1, "  Ayşe ", "Yılmaz").unwrap();
        assert_eq!(s.first_name, "Ayşe");
        assert!(NewStudent::new(1, "   ", "Yılmaz").is_err());
        assert!(NewStudent::new(1, "Ali", "").is_err());
    }

    #[test]
    fn role_round_trips_as_lowercase() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        let teacher: Teacher =
            serde_json::from_value(serde_json::json!({"id": 1, "user_id": "u", "name": "Elif"}))
                .unwrap();
        assert_eq!(teacher.role, Role::Teacher);
    }
}
