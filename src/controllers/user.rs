use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::controllers::upload::{Folder, ImageUpload, UploadController};
use crate::core::error::{self, Error};
use crate::store::UserStore;
use crate::types::request::{LoginData, ProfileData, RegisterData, UpdatePasswordData};
use crate::types::response;
use crate::types::user::{NewUser, ProfileChanges, Role, Session, User, UserId};
use crate::utils::auth::SessionKeys;

const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone)]
pub(crate) struct UserController {
    users: Arc<dyn UserStore>,
    sessions: SessionKeys,
    uploads: UploadController,
    bcrypt_cost: u32,
    file_base_url: String,
    email_pattern: Regex,
    qq_pattern: Regex,
}

impl std::fmt::Debug for UserController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserController")
            .field("email_pattern", &self.email_pattern.as_str())
            .field("qq_pattern", &self.qq_pattern.as_str())
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

impl UserController {
    pub(crate) fn new(
        users: Arc<dyn UserStore>,
        sessions: SessionKeys,
        uploads: UploadController,
        bcrypt_cost: u32,
        file_base_url: String,
    ) -> Result<Self, error::ConfigError> {
        Ok(Self {
            users,
            sessions,
            uploads,
            bcrypt_cost,
            file_base_url,
            email_pattern: Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")?,
            qq_pattern: Regex::new(r"^\d{5,12}$")?,
        })
    }

    pub(crate) async fn find(&self, id: UserId) -> Result<Option<User>, Error> {
        self.users.find_by_id(id).await
    }

    pub(crate) async fn register(&self, data: RegisterData) -> Result<(User, String), Error> {
        let RegisterData {
            username,
            password,
            email,
        } = data;

        if username.is_empty() || password.is_empty() || email.is_empty() {
            return Err(Error::Validation("Please fill in all required fields".into()));
        }

        if !(3..=16).contains(&username.chars().count()) {
            return Err(Error::Validation(
                "Username must be between 3 and 16 characters".into(),
            ));
        }

        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(Error::Validation(
                "Password must be at least 6 characters".into(),
            ));
        }

        if !self.email_pattern.is_match(&email) {
            return Err(Error::Validation(
                "Please enter a valid email address".into(),
            ));
        }

        if self.users.find_by_username(&username).await?.is_some() {
            return Err(Error::UsernameTaken);
        }

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(Error::EmailTaken);
        }

        let user = self
            .users
            .insert_user(NewUser {
                username,
                password_hash: self.hash(&password)?,
                email,
                role: Role::User,
            })
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "registered user");

        let token = self.sessions.issue(user.id)?;

        Ok((user, token))
    }

    pub(crate) async fn login(&self, data: LoginData) -> Result<(User, String), Error> {
        if data.username.is_empty() || data.password.is_empty() {
            return Err(Error::Validation(
                "Please enter a username and password".into(),
            ));
        }

        let user = self
            .users
            .find_by_username(&data.username)
            .await?
            .ok_or(Error::UserNotFound)?;

        if !bcrypt::verify(&data.password, &user.password_hash)? {
            return Err(Error::IncorrectPassword);
        }

        let token = self.sessions.issue(user.id)?;

        Ok((user, token))
    }

    pub(crate) async fn profile(&self, session: &Session) -> Result<response::Profile, Error> {
        let user = self.find(session.user_id).await?.ok_or(Error::UserNotFound)?;

        Ok(response::Profile::new(&user, &self.file_base_url))
    }

    pub(crate) async fn update_profile(
        &self,
        session: &Session,
        data: ProfileData,
    ) -> Result<response::Profile, Error> {
        let mut errors = BTreeMap::new();

        if let Some(nickname) = &data.nickname {
            if !(2..=12).contains(&nickname.chars().count()) {
                errors.insert("nickname", "Nickname must be between 2 and 12 characters");
            }
        }

        if let Some(email) = &data.email {
            if !self.email_pattern.is_match(email) {
                errors.insert("email", "Please enter a valid email address");
            }
        }

        if let Some(qq) = &data.qq {
            if !self.qq_pattern.is_match(qq) {
                errors.insert("qq", "QQ number must be 5-12 digits");
            }
        }

        if !errors.is_empty() {
            return Err(Error::InvalidFields(errors));
        }

        let changes = ProfileChanges {
            nickname: data.nickname,
            qq: data.qq,
            email: data.email,
        };

        let user = self
            .users
            .update_profile(session.user_id, changes)
            .await?
            .ok_or(Error::UserNotFound)?;

        Ok(response::Profile::new(&user, &self.file_base_url))
    }

    pub(crate) async fn change_password(
        &self,
        session: &Session,
        data: UpdatePasswordData,
    ) -> Result<(), Error> {
        let user = self.find(session.user_id).await?.ok_or(Error::UserNotFound)?;

        if data.current_password.is_empty()
            || !bcrypt::verify(&data.current_password, &user.password_hash)?
        {
            return Err(Error::Validation("Current password is incorrect".into()));
        }

        if data.new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(Error::Validation(
                "Password must be at least 6 characters".into(),
            ));
        }

        let password_hash = self.hash(&data.new_password)?;

        if !self.users.set_password_hash(user.id, &password_hash).await? {
            return Err(Error::UserNotFound);
        }

        tracing::info!(user_id = user.id, "password changed");

        Ok(())
    }

    pub(crate) async fn set_avatar(
        &self,
        session: &Session,
        upload: ImageUpload,
    ) -> Result<response::Avatar, Error> {
        let user = self.find(session.user_id).await?.ok_or(Error::UserNotFound)?;

        let avatar = self.uploads.save(Folder::Avatars, upload).await?;

        match self.users.set_avatar(user.id, &avatar).await {
            Ok(true) => (),
            Ok(false) => {
                self.uploads.discard(&avatar).await;
                return Err(Error::UserNotFound);
            }
            Err(e) => {
                self.uploads.discard(&avatar).await;
                return Err(e);
            }
        }

        if !user.avatar.is_empty() {
            self.uploads.discard(&user.avatar).await;
        }

        Ok(response::Avatar {
            avatar_url: format!("{}{}", self.file_base_url, avatar),
        })
    }

    fn hash(&self, value: &str) -> Result<String, Error> {
        bcrypt::hash(value, self.bcrypt_cost).map_err(Error::Bcrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use axum::body::Bytes;
    use chrono::Duration;

    /// Delegates to a [`MemoryStore`] but fails every avatar write.
    struct BrokenAvatars(MemoryStore);

    #[async_trait]
    impl UserStore for BrokenAvatars {
        async fn insert_user(&self, user: NewUser) -> Result<User, Error> {
            self.0.insert_user(user).await
        }

        async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error> {
            self.0.find_by_id(id).await
        }

        async fn find_by_username(&self, username: &str) -> Result<Option<User>, Error> {
            self.0.find_by_username(username).await
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
            self.0.find_by_email(email).await
        }

        async fn update_profile(
            &self,
            id: UserId,
            changes: ProfileChanges,
        ) -> Result<Option<User>, Error> {
            self.0.update_profile(id, changes).await
        }

        async fn set_password_hash(&self, id: UserId, password_hash: &str) -> Result<bool, Error> {
            self.0.set_password_hash(id, password_hash).await
        }

        async fn set_avatar(&self, _: UserId, _: &str) -> Result<bool, Error> {
            Err(Error::IO(std::io::Error::other("disk full")))
        }
    }

    fn controller() -> UserController {
        UserController::new(
            Arc::new(MemoryStore::new()),
            SessionKeys::new("test-secret", Duration::hours(1)),
            UploadController::new(std::env::temp_dir().join("campus-market-user-tests")),
            4,
            String::new(),
        )
        .unwrap()
    }

    fn registration(username: &str, password: &str, email: &str) -> RegisterData {
        RegisterData {
            username: username.into(),
            password: password.into(),
            email: email.into(),
        }
    }

    #[tokio::test]
    async fn stored_password_is_hashed() {
        let users = controller();
        let (user, token) = users
            .register(registration("alice", "secret1", "a@x.com"))
            .await
            .unwrap();

        assert_ne!(user.password_hash, "secret1");
        assert!(bcrypt::verify("secret1", &user.password_hash).unwrap());
        assert_eq!(users.sessions.verify(&token).unwrap().user_id, user.id);
    }

    #[tokio::test]
    async fn registration_is_validated() {
        let users = controller();

        for data in [
            registration("", "secret1", "a@x.com"),
            registration("al", "secret1", "a@x.com"),
            registration("a_very_long_username", "secret1", "a@x.com"),
            registration("alice", "short", "a@x.com"),
            registration("alice", "secret1", "not-an-email"),
        ] {
            assert!(matches!(
                users.register(data).await,
                Err(Error::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn username_length_counts_characters() {
        let users = controller();
        // three CJK characters are nine bytes
        assert!(users.register(registration("张小明", "secret1", "z@x.com")).await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let users = controller();
        users
            .register(registration("alice", "secret1", "a@x.com"))
            .await
            .unwrap();

        assert!(matches!(
            users.register(registration("alice", "secret1", "b@x.com")).await,
            Err(Error::UsernameTaken)
        ));
        assert!(matches!(
            users.register(registration("bob", "secret1", "a@x.com")).await,
            Err(Error::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn login_distinguishes_unknown_user_and_wrong_password() {
        let users = controller();
        users
            .register(registration("alice", "secret1", "a@x.com"))
            .await
            .unwrap();

        let login = |username: &str, password: &str| LoginData {
            username: username.into(),
            password: password.into(),
        };

        assert!(matches!(
            users.login(login("nobody", "secret1")).await,
            Err(Error::UserNotFound)
        ));
        assert!(matches!(
            users.login(login("alice", "wrong")).await,
            Err(Error::IncorrectPassword)
        ));
        assert!(users.login(login("alice", "secret1")).await.is_ok());
    }

    #[tokio::test]
    async fn change_password_requires_current_password() {
        let users = controller();
        let (user, _) = users
            .register(registration("alice", "secret1", "a@x.com"))
            .await
            .unwrap();
        let session = Session { user_id: user.id };

        let wrong = UpdatePasswordData {
            current_password: "nope".into(),
            new_password: "secret2".into(),
        };
        assert!(matches!(
            users.change_password(&session, wrong).await,
            Err(Error::Validation(_))
        ));

        let right = UpdatePasswordData {
            current_password: "secret1".into(),
            new_password: "secret2".into(),
        };
        users.change_password(&session, right).await.unwrap();

        let stored = users.find(user.id).await.unwrap().unwrap();
        assert!(bcrypt::verify("secret2", &stored.password_hash).unwrap());
        assert!(!bcrypt::verify("secret1", &stored.password_hash).unwrap());
    }

    #[tokio::test]
    async fn profile_update_reports_every_invalid_field() {
        let users = controller();
        let (user, _) = users
            .register(registration("alice", "secret1", "a@x.com"))
            .await
            .unwrap();
        let session = Session { user_id: user.id };

        let data = ProfileData {
            nickname: Some("x".into()),
            qq: Some("12ab".into()),
            email: Some("bad".into()),
        };

        match users.update_profile(&session, data).await {
            Err(Error::InvalidFields(errors)) => {
                assert_eq!(errors.len(), 3);
            }
            other => panic!("expected field errors, got {other:?}"),
        }

        let data = ProfileData {
            nickname: Some("小爱".into()),
            qq: Some("123456".into()),
            email: None,
        };
        let profile = users.update_profile(&session, data).await.unwrap();
        assert_eq!(profile.nickname, "小爱");
        assert_eq!(profile.qq, "123456");
        assert_eq!(profile.email, "a@x.com");
    }

    #[tokio::test]
    async fn failed_avatar_write_removes_the_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let users = UserController::new(
            Arc::new(BrokenAvatars(MemoryStore::new())),
            SessionKeys::new("test-secret", Duration::hours(1)),
            UploadController::new(dir.path().to_path_buf()),
            4,
            String::new(),
        )
        .unwrap();
        let (user, _) = users
            .register(registration("alice", "secret1", "a@x.com"))
            .await
            .unwrap();

        let upload = ImageUpload {
            file_name: Some("me.png".into()),
            content_type: Some("image/png".into()),
            bytes: Bytes::from_static(b"png"),
        };
        let result = users.set_avatar(&Session { user_id: user.id }, upload).await;
        assert!(matches!(result, Err(Error::IO(_))));

        let mut avatars = tokio::fs::read_dir(dir.path().join("avatars")).await.unwrap();
        assert!(avatars.next_entry().await.unwrap().is_none());
    }
}
