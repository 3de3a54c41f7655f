//! User repository implementation

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension, ToSql};

use crate::error::{Error, Result};
use crate::models::{NewUser, User, UserRole};
use crate::sync::Session;
use crate::util::{normalize_text_option, require_text};

const COLUMNS: &str = "id, nome, data_nascimento, funcao, usuario, tipo";

impl FromSql for UserRole {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
    }
}

impl ToSql for UserRole {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

pub struct UserRepository<'a> {
    session: &'a Session<'a>,
}

impl<'a> UserRepository<'a> {
    pub const fn new(session: &'a Session<'a>) -> Self {
        Self { session }
    }

    fn parse_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            birth_date: row.get(2)?,
            job_title: row.get(3)?,
            login: row.get(4)?,
            role: row.get(5)?,
        })
    }

    fn admin_count(&self) -> Result<i64> {
        Ok(self.session.connection().query_row(
            "SELECT COUNT(*) FROM usuarios WHERE tipo = 'admin'",
            [],
            |row| row.get(0),
        )?)
    }

    pub fn create(&self, user: &NewUser) -> Result<User> {
        self.session
            .connection()
            .execute(
                "INSERT INTO usuarios (nome, data_nascimento, funcao, usuario, senha, tipo)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.name,
                    user.birth_date,
                    user.job_title,
                    user.login,
                    user.password,
                    user.role,
                ],
            )
            .map_err(|error| Error::duplicate_on_conflict(error, format!("login {}", user.login)))?;
        self.session.mark_dirty();

        Ok(User {
            id: self.session.connection().last_insert_rowid(),
            name: user.name.clone(),
            birth_date: user.birth_date.clone(),
            job_title: user.job_title.clone(),
            login: user.login.clone(),
            role: user.role,
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<User>> {
        Ok(self
            .session
            .connection()
            .query_row(
                &format!("SELECT {COLUMNS} FROM usuarios WHERE id = ?1"),
                params![id],
                Self::parse_user,
            )
            .optional()?)
    }

    pub fn get_by_login(&self, login: &str) -> Result<Option<User>> {
        Ok(self
            .session
            .connection()
            .query_row(
                &format!("SELECT {COLUMNS} FROM usuarios WHERE usuario = ?1"),
                params![login],
                Self::parse_user,
            )
            .optional()?)
    }

    pub fn list(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .session
            .connection()
            .prepare(&format!("SELECT {COLUMNS} FROM usuarios ORDER BY nome, id"))?;
        let users = stmt
            .query_map([], Self::parse_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// The user matching `login` and `password`, if any.
    ///
    /// Passwords are stored as given so existing databases keep working.
    pub fn authenticate(&self, login: &str, password: &str) -> Result<Option<User>> {
        let user = self
            .session
            .connection()
            .query_row(
                &format!("SELECT {COLUMNS} FROM usuarios WHERE usuario = ?1 AND senha = ?2"),
                params![login.trim(), password],
                Self::parse_user,
            )
            .optional()?;
        if user.is_none() {
            tracing::warn!("Failed login attempt for '{}'", login.trim());
        }
        Ok(user)
    }

    /// Update name, details and role. Demoting the last administrator is refused.
    pub fn update(
        &self,
        login: &str,
        name: &str,
        birth_date: Option<String>,
        job_title: Option<String>,
        role: UserRole,
    ) -> Result<User> {
        let current = self
            .get_by_login(login)?
            .ok_or_else(|| Error::NotFound(format!("user {login}")))?;
        if current.role == UserRole::Admin && role != UserRole::Admin && self.admin_count()? <= 1 {
            return Err(Error::InvalidInput(format!(
                "{login} is the last administrator"
            )));
        }

        let name = require_text(name, "user name")?;
        self.session.connection().execute(
            "UPDATE usuarios SET nome = ?1, data_nascimento = ?2, funcao = ?3, tipo = ?4
             WHERE usuario = ?5",
            params![
                name,
                normalize_text_option(birth_date),
                normalize_text_option(job_title),
                role,
                login,
            ],
        )?;
        self.session.mark_dirty();

        self.get_by_login(login)?
            .ok_or_else(|| Error::NotFound(format!("user {login}")))
    }

    pub fn set_password(&self, login: &str, password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(Error::InvalidInput("password cannot be empty".to_string()));
        }
        let updated = self.session.connection().execute(
            "UPDATE usuarios SET senha = ?1 WHERE usuario = ?2",
            params![password, login],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("user {login}")));
        }
        self.session.mark_dirty();
        Ok(())
    }

    /// Delete a user. The last administrator cannot be deleted.
    pub fn delete(&self, login: &str) -> Result<()> {
        let user = self
            .get_by_login(login)?
            .ok_or_else(|| Error::NotFound(format!("user {login}")))?;
        if user.role == UserRole::Admin && self.admin_count()? <= 1 {
            return Err(Error::InvalidInput(format!(
                "{login} is the last administrator"
            )));
        }

        self.session
            .connection()
            .execute("DELETE FROM usuarios WHERE id = ?1", params![user.id])?;
        self.session.mark_dirty();
        Ok(())
    }
}
