//! 会话状态
//!
//! 登录时初始化，登出时清空。快照同时写入偏好文件，下次启动可以恢复。

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{AppResult, BusinessError};
use crate::infrastructure::{PrefsFile, SessionSnapshot};
use crate::models::{AnalysisReply, Role, Student, Teacher, User};

/// 登录后进入的页面
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Login,
    AdminDashboard,
    TeacherDashboard,
    Learning,
}

/// 按角色路由；没有会话时回到登录页
pub fn route(role: Option<Role>) -> View {
    match role {
        None => View::Login,
        Some(Role::Admin) => View::AdminDashboard,
        Some(Role::Teacher) => View::TeacherDashboard,
        Some(Role::User) => View::Learning,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub user: Option<User>,
    pub teacher: Option<Teacher>,
    pub student: Option<Student>,
    pub story_id: Option<i64>,
    pub level: Option<u8>,
    pub step: Option<u32>,
    pub last_analysis: Option<AnalysisReply>,
}

impl SessionState {
    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|u| u.role)
    }

    fn snapshot(&self) -> Option<SessionSnapshot> {
        self.user.as_ref()?;
        Some(SessionSnapshot {
            user: self.user.clone(),
            teacher: self.teacher.clone(),
            student: self.student.clone(),
        })
    }
}

#[derive(Clone)]
pub struct SessionStore {
    state: Arc<RwLock<SessionState>>,
    prefs: PrefsFile,
}

impl SessionStore {
    pub fn new(prefs: PrefsFile) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            prefs,
        }
    }

    /// 从偏好文件恢复上次的登录信息
    pub async fn restore(&self) -> Option<Role> {
        let snapshot = self.prefs.load().await.session?;
        let mut state = self.state.write().await;
        *state = SessionState {
            user: snapshot.user,
            teacher: snapshot.teacher,
            student: snapshot.student,
            ..Default::default()
        };
        let role = state.role();
        if let Some(role) = role {
            info!("🔑 已恢复会话 ({})", role);
        }
        role
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn view(&self) -> View {
        route(self.state.read().await.role())
    }

    async fn persist(&self) -> AppResult<()> {
        let snapshot = self.state.read().await.snapshot();
        self.prefs.update(|p| p.session = snapshot).await.map(|_| ())
    }

    /// 教师（或管理员）登录
    pub async fn login_teacher(&self, user: User, teacher: Teacher) -> AppResult<View> {
        {
            let mut state = self.state.write().await;
            *state = SessionState {
                user: Some(User {
                    role: teacher.role,
                    ..user
                }),
                teacher: Some(teacher),
                ..Default::default()
            };
        }
        self.persist().await?;
        Ok(self.view().await)
    }

    /// 学生进入学习模式
    pub async fn login_student(&self, student: Student, story_id: i64) -> AppResult<View> {
        {
            let mut state = self.state.write().await;
            *state = SessionState {
                user: Some(User {
                    id: format!("student-{}", student.id),
                    email: None,
                    role: Role::User,
                }),
                student: Some(student),
                story_id: Some(story_id),
                ..Default::default()
            };
        }
        self.persist().await?;
        Ok(View::Learning)
    }

    pub async fn logout(&self) -> AppResult<()> {
        *self.state.write().await = SessionState::default();
        self.persist().await?;
        info!("👋 已登出");
        Ok(())
    }

    /// 当前学生；未登录时报错
    pub async fn current_student(&self) -> AppResult<Student> {
        self.state
            .read()
            .await
            .student
            .clone()
            .ok_or_else(|| BusinessError::NotLoggedIn.into())
    }

    pub async fn set_position(&self, level: u8, step: u32) {
        let mut state = self.state.write().await;
        state.level = Some(level);
        state.step = Some(step);
    }

    pub async fn set_last_analysis(&self, reply: &AnalysisReply) {
        let mut state = self.state.write().await;
        if state.user.is_none() {
            warn!("⚠️ 会话已结束，丢弃分析结果");
            return;
        }
        state.last_analysis = Some(reply.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teacher(role: Role) -> (User, Teacher) {
        (
            User {
                id: "u-1".into(),
                email: Some("ogretmen@okul.tr".into()),
                role: Role::User,
            },
            Teacher {
                id: 1,
                user_id: "u-1".into(),
                name: "Ayşe".into(),
                school: None,
                role,
            },
        )
    }

    #[test]
    fn routes_by_role() {
        assert_eq!(route(None), View::Login);
        assert_eq!(route(Some(Role::Admin)), View::AdminDashboard);
        assert_eq!(route(Some(Role::Teacher)), View::TeacherDashboard);
        assert_eq!(route(Some(Role::User)), View::Learning);
    }

    #[tokio::test]
    async fn login_persists_and_logout_clears() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = PrefsFile::new(dir.path().join("prefs.json"));
        let store = SessionStore::new(prefs.clone());

        let (user, t) = teacher(Role::Admin);
        assert_eq!(store.login_teacher(user, t).await.unwrap(), View::AdminDashboard);

        let restored = SessionStore::new(prefs.clone());
        assert_eq!(restored.restore().await, Some(Role::Admin));

        store.logout().await.unwrap();
        assert_eq!(store.view().await, View::Login);
        assert!(prefs.load().await.session.is_none());
    }

    #[tokio::test]
    async fn last_analysis_requires_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(PrefsFile::new(dir.path().join("p.json")));
        store.set_last_analysis(&AnalysisReply::fallback("merhaba")).await;
        assert!(store.state().await.last_analysis.is_none());
        assert!(store.current_student().await.is_err());
    }
}
