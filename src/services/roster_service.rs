//! 教师与学生名单服务 - 业务能力层

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clients::store::{from_row, from_rows, tables, DataStore, Query};
use crate::models::{NewStudent, Role, Student, Teacher};

pub struct RosterService {
    store: Arc<dyn DataStore>,
}

impl RosterService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// 注册时创建教师行
    pub async fn sign_up_teacher(
        &self,
        user_id: &str,
        name: &str,
        school: Option<&str>,
        role: Role,
    ) -> Result<Teacher> {
        if !matches!(role, Role::Teacher | Role::Admin) {
            anyhow::bail!("教师账号的角色只能是 teacher 或 admin，收到 {}", role);
        }
        let row = self
            .store
            .insert(
                tables::TEACHERS,
                json!({
                    "user_id": user_id,
                    "name": name.trim(),
                    "school": school,
                    "role": role,
                }),
            )
            .await?;
        let teacher: Teacher = from_row(tables::TEACHERS, row)?;
        info!("✓ 教师已注册: {} ({})", teacher.name, teacher.role);
        Ok(teacher)
    }

    /// 登录时按认证用户查找教师
    pub async fn find_teacher_by_user(&self, user_id: &str) -> Result<Option<Teacher>> {
        let row = self
            .store
            .select_one(tables::TEACHERS, &Query::new().eq("user_id", user_id))
            .await?;
        Ok(row.map(|r| from_row(tables::TEACHERS, r)).transpose()?)
    }

    pub async fn get_student(&self, student_id: i64) -> Result<Option<Student>> {
        let row = self
            .store
            .select_one(tables::STUDENTS, &Query::new().eq("id", student_id))
            .await?;
        Ok(row.map(|r| from_row(tables::STUDENTS, r)).transpose()?)
    }

    /// 教师名下的学生，按创建顺序
    pub async fn get_students(&self, teacher_id: i64) -> Result<Vec<Student>> {
        let rows = self
            .store
            .select(
                tables::STUDENTS,
                &Query::new().eq("teacher_id", teacher_id).order("id", true),
            )
            .await?;
        Ok(from_rows(tables::STUDENTS, rows)?)
    }

    /// 插入一名学生并返回写入后的行
    pub async fn add_student(&self, new_student: &NewStudent) -> Result<Student> {
        let row = self
            .store
            .insert(tables::STUDENTS, serde_json::to_value(new_student)?)
            .await?;
        Ok(from_row(tables::STUDENTS, row)?)
    }

    pub async fn delete_student(&self, student_id: i64) -> Result<bool> {
        let n = self
            .store
            .delete(tables::STUDENTS, &Query::new().eq("id", student_id))
            .await?;
        if n == 0 {
            warn!("⚠️ 要删除的学生不存在: #{}", student_id);
        }
        Ok(n > 0)
    }
}

/// 教师面板上显示的学生列表
pub struct StudentList {
    pub teacher_id: i64,
    pub students: Vec<Student>,
    /// 最近一次表单错误
    pub form_error: Option<String>,
}

impl StudentList {
    pub async fn load(roster: &RosterService, teacher_id: i64) -> Result<Self> {
        Ok(Self {
            teacher_id,
            students: roster.get_students(teacher_id).await?,
            form_error: None,
        })
    }

    /// 添加学生：插入一行并追加到列表末尾
    ///
    /// 失败时不改动列表，错误写入 `form_error` 并返回
    pub async fn handle_add_student(
        &mut self,
        roster: &RosterService,
        first_name: &str,
        last_name: &str,
    ) -> Result<&Student> {
        self.form_error = None;
        let result = match NewStudent::new(self.teacher_id, first_name, last_name) {
            Ok(new_student) => roster.add_student(&new_student).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(student) => {
                info!("✓ 学生已添加: {}", student.full_name());
                self.students.push(student);
                Ok(&self.students[self.students.len() - 1])
            }
            Err(e) => {
                warn!("⚠️ 添加学生失败: {}", e);
                self.form_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MemoryStore;

    #[tokio::test]
    async fn teacher_sign_up_and_lookup() {
        let roster = RosterService::new(Arc::new(MemoryStore::new()));
        let t = roster
            .sign_up_teacher("auth-1", " Zeynep ", Some("Atatürk İlkokulu"), Role::Teacher)
            .await
            .unwrap();
        assert_eq!(t.name, "Zeynep");
        assert_eq!(roster.find_teacher_by_user("auth-1").await.unwrap(), Some(t));
        assert!(roster.find_teacher_by_user("nobody").await.unwrap().is_none());
        assert!(roster
            .sign_up_teacher("auth-2", "X", None, Role::User)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn invalid_name_leaves_list_untouched() {
        let store = Arc::new(MemoryStore::new());
        let roster = RosterService::new(store.clone());
        let mut list = StudentList::load(&roster, 1).await.unwrap();

        assert!(list.handle_add_student(&roster, " ", "Kaya").await.is_err());
        assert!(list.form_error.is_some());
        assert!(list.students.is_empty());
        assert_eq!(store.count(tables::STUDENTS).await, 0);
    }
}
