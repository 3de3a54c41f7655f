//! Database migrations and schema bootstrap

use rusqlite::{params, Connection};

use crate::error::Result;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// Login of the administrator seeded into a fresh database.
pub const DEFAULT_ADMIN_LOGIN: &str = "admin";
const DEFAULT_ADMIN_NAME: &str = "Administrador";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// What a call to [`run`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: i32,
    pub to_version: i32,
    pub seeded_admin: bool,
}

impl MigrationReport {
    /// Whether the file content changed and needs pushing.
    pub const fn changed(&self) -> bool {
        self.from_version != self.to_version || self.seeded_admin
    }
}

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<MigrationReport> {
    let from_version = get_version(conn)?;
    let mut seeded_admin = false;

    if from_version < 1 {
        seeded_admin = migrate_v1(conn)?;
    }
    if from_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(MigrationReport {
        from_version,
        to_version: get_version(conn)?,
        seeded_admin,
    })
}

/// Get the current schema version
pub fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?)
}

/// Migration to version 1: business schema plus the default administrator.
///
/// Tables use `IF NOT EXISTS` so files created before versioning are adopted
/// in place. Returns whether the administrator was seeded.
fn migrate_v1(conn: &Connection) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS usuarios (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nome TEXT NOT NULL,
            data_nascimento TEXT,
            funcao TEXT,
            usuario TEXT UNIQUE NOT NULL,
            senha TEXT NOT NULL,
            tipo TEXT CHECK(tipo IN ('admin', 'ope')) NOT NULL
        );
        CREATE TABLE IF NOT EXISTS funcionarios (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nome TEXT NOT NULL,
            data_nascimento TEXT,
            cpf TEXT UNIQUE NOT NULL,
            cod_funcionario TEXT UNIQUE NOT NULL,
            funcao TEXT
        );
        CREATE TABLE IF NOT EXISTS empresas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nome TEXT NOT NULL,
            cnpj TEXT UNIQUE NOT NULL,
            cod_empresa TEXT UNIQUE NOT NULL,
            pasta_empresa TEXT
        );
        CREATE TABLE IF NOT EXISTS contratos (
            numero_contrato TEXT PRIMARY KEY,
            cod_empresa TEXT NOT NULL,
            empresa_contratada TEXT,
            titulo TEXT,
            especificacoes TEXT,
            pasta_contrato TEXT,
            FOREIGN KEY(cod_empresa) REFERENCES empresas(cod_empresa)
        );
        CREATE TABLE IF NOT EXISTS unidades (
            cod_unidade TEXT PRIMARY KEY,
            numero_contrato TEXT NOT NULL,
            nome_unidade TEXT NOT NULL,
            estado TEXT,
            cidade TEXT,
            localizacao TEXT,
            pasta_unidade TEXT,
            FOREIGN KEY(numero_contrato) REFERENCES contratos(numero_contrato)
        );
        CREATE TABLE IF NOT EXISTS servicos (
            cod_servico TEXT PRIMARY KEY,
            cod_unidade TEXT NOT NULL,
            tipo_servico TEXT,
            data_criacao TEXT,
            data_execucao TEXT,
            status TEXT CHECK(status IN ('Ativo', 'Em andamento', 'Pausada', 'Encerrado')),
            observacoes TEXT,
            pasta_servico TEXT,
            FOREIGN KEY(cod_unidade) REFERENCES unidades(cod_unidade)
        );
        CREATE TABLE IF NOT EXISTS servico_funcionarios (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cod_servico TEXT NOT NULL,
            cod_funcionario TEXT NOT NULL,
            FOREIGN KEY(cod_servico) REFERENCES servicos(cod_servico),
            FOREIGN KEY(cod_funcionario) REFERENCES funcionarios(cod_funcionario)
        );
        CREATE TABLE IF NOT EXISTS arquivos_servico (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cod_servico TEXT NOT NULL,
            nome_arquivo TEXT NOT NULL,
            tipo_arquivo TEXT NOT NULL,
            drive_file_id TEXT NOT NULL,
            data_upload TEXT NOT NULL,
            descricao TEXT,
            FOREIGN KEY(cod_servico) REFERENCES servicos(cod_servico)
        );
        CREATE TABLE IF NOT EXISTS arquivos_contrato (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            numero_contrato TEXT NOT NULL,
            nome_arquivo TEXT NOT NULL,
            tipo_arquivo TEXT NOT NULL,
            drive_file_id TEXT NOT NULL,
            data_upload TEXT NOT NULL,
            descricao TEXT,
            FOREIGN KEY(numero_contrato) REFERENCES contratos(numero_contrato)
        );
        CREATE TABLE IF NOT EXISTS arquivos_unidade (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cod_unidade TEXT NOT NULL,
            nome_arquivo TEXT NOT NULL,
            tipo_arquivo TEXT NOT NULL,
            drive_file_id TEXT NOT NULL,
            data_upload TEXT NOT NULL,
            descricao TEXT,
            FOREIGN KEY(cod_unidade) REFERENCES unidades(cod_unidade)
        );",
    )?;

    let admins: i64 = tx.query_row(
        "SELECT COUNT(*) FROM usuarios WHERE tipo = 'admin'",
        [],
        |row| row.get(0),
    )?;
    let seeded_admin = admins == 0;
    if seeded_admin {
        tx.execute(
            "INSERT INTO usuarios (nome, usuario, senha, tipo) VALUES (?1, ?2, ?3, 'admin')",
            params![DEFAULT_ADMIN_NAME, DEFAULT_ADMIN_LOGIN, DEFAULT_ADMIN_PASSWORD],
        )?;
        tracing::info!("Seeded default administrator '{DEFAULT_ADMIN_LOGIN}'");
    }

    tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    tx.commit()?;

    tracing::info!("Migrated database to version 1");
    Ok(seeded_admin)
}

/// Migration to version 2: folder-id columns for files predating them, plus
/// indexes on the foreign-key columns.
fn migrate_v2(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    for (table, column) in [
        ("empresas", "pasta_empresa"),
        ("contratos", "pasta_contrato"),
        ("unidades", "pasta_unidade"),
        ("servicos", "pasta_servico"),
    ] {
        if !has_column(&tx, table, column)? {
            tx.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} TEXT"))?;
            tracing::info!("Added column {table}.{column}");
        }
    }

    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_contratos_empresa ON contratos(cod_empresa);
        CREATE INDEX IF NOT EXISTS idx_unidades_contrato ON unidades(numero_contrato);
        CREATE INDEX IF NOT EXISTS idx_servicos_unidade ON servicos(cod_unidade);
        CREATE INDEX IF NOT EXISTS idx_servico_funcionarios_servico
            ON servico_funcionarios(cod_servico);
        CREATE INDEX IF NOT EXISTS idx_servico_funcionarios_funcionario
            ON servico_funcionarios(cod_funcionario);
        CREATE INDEX IF NOT EXISTS idx_arquivos_servico_servico
            ON arquivos_servico(cod_servico);
        CREATE INDEX IF NOT EXISTS idx_arquivos_contrato_contrato
            ON arquivos_contrato(numero_contrato);
        CREATE INDEX IF NOT EXISTS idx_arquivos_unidade_unidade ON arquivos_unidade(cod_unidade);
        INSERT INTO schema_version (version) VALUES (2);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names.iter().any(|name| name == column))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn admin_count(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM usuarios WHERE tipo = 'admin'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        let report = run(&conn).unwrap();

        assert_eq!(report.from_version, 0);
        assert_eq!(report.to_version, CURRENT_VERSION);
        assert!(report.seeded_admin);
        assert_eq!(admin_count(&conn), 1);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        let second = run(&conn).unwrap();

        assert!(!second.changed());
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
        assert_eq!(admin_count(&conn), 1);
    }

    #[test]
    fn existing_admin_is_not_duplicated() {
        let conn = setup();
        conn.execute_batch(
            "CREATE TABLE usuarios (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nome TEXT NOT NULL,
                data_nascimento TEXT,
                funcao TEXT,
                usuario TEXT UNIQUE NOT NULL,
                senha TEXT NOT NULL,
                tipo TEXT NOT NULL
            );
            INSERT INTO usuarios (nome, usuario, senha, tipo)
                VALUES ('Chefe', 'chefe', 'x', 'admin');",
        )
        .unwrap();

        let report = run(&conn).unwrap();
        assert!(!report.seeded_admin);
        assert!(report.changed());
        assert_eq!(admin_count(&conn), 1);
    }

    #[test]
    fn v2_adds_missing_folder_columns() {
        let conn = setup();
        conn.execute_batch(
            "CREATE TABLE empresas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nome TEXT NOT NULL,
                cnpj TEXT UNIQUE NOT NULL,
                cod_empresa TEXT UNIQUE NOT NULL
            );",
        )
        .unwrap();

        run(&conn).unwrap();
        assert!(has_column(&conn, "empresas", "pasta_empresa").unwrap());
    }
}
