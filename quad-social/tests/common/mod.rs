#![allow(dead_code)]

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::Connection;
use uuid::Uuid;

use quad_social::models::{Profile, Role};
use quad_social::services::profile_service::{self, ProfileChanges};

pub const DATABASE_ENV: &str = "QUAD_TEST_DATABASE_URL";

const SCHEMA_SQL: &str = include_str!("../../migrations/2025-01-01-000000_init/up.sql");

/// A connection inside a rolled-back test transaction with the schema
/// created in a throwaway namespace. `None` when no test database is set.
pub fn test_connection() -> Option<PgConnection> {
    let Ok(url) = std::env::var(DATABASE_ENV) else {
        eprintln!("{DATABASE_ENV} not set, skipping database test");
        return None;
    };

    let mut conn = PgConnection::establish(&url).expect("connect to test database");
    conn.begin_test_transaction().expect("begin test transaction");

    let namespace = format!("quad_test_{}", Uuid::new_v4().simple());
    conn.batch_execute(&format!(
        "CREATE SCHEMA {namespace}; SET LOCAL search_path TO {namespace}, public;"
    ))
    .expect("create test schema");
    conn.batch_execute(SCHEMA_SQL).expect("apply migration");

    Some(conn)
}

/// A throwaway schema whose writes really commit, for tests that need
/// several connections to see each other. Dropped with the value.
pub struct ScratchDatabase {
    url: String,
    namespace: String,
}

impl ScratchDatabase {
    pub fn create() -> Option<Self> {
        let Ok(url) = std::env::var(DATABASE_ENV) else {
            eprintln!("{DATABASE_ENV} not set, skipping database test");
            return None;
        };
        let db = Self { url, namespace: format!("quad_test_{}", Uuid::new_v4().simple()) };

        let mut conn = PgConnection::establish(&db.url).expect("connect to test database");
        conn.batch_execute(&format!(
            "CREATE SCHEMA {ns}; SET search_path TO {ns}, public;",
            ns = db.namespace
        ))
        .expect("create test schema");
        conn.batch_execute(SCHEMA_SQL).expect("apply migration");

        Some(db)
    }

    /// A fresh session pointed at the scratch schema.
    pub fn connect(&self) -> PgConnection {
        let mut conn = PgConnection::establish(&self.url).expect("connect to test database");
        conn.batch_execute(&format!("SET search_path TO {}, public;", self.namespace))
            .expect("select test schema");
        conn
    }
}

impl Drop for ScratchDatabase {
    fn drop(&mut self) {
        if let Ok(mut conn) = PgConnection::establish(&self.url) {
            let _ = conn.batch_execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE;", self.namespace));
        }
    }
}

pub fn user(conn: &mut PgConnection, username: &str) -> Uuid {
    let id = Uuid::new_v4();
    profile_service::register_user(conn, id, username).expect("register user");
    id
}

pub fn cio(conn: &mut PgConnection, username: &str) -> Uuid {
    let id = user(conn, username);
    set_role(conn, id, Role::Cio);
    id
}

pub fn set_role(conn: &mut PgConnection, user_id: Uuid, role: Role) -> Profile {
    profile_service::update_profile(
        conn,
        user_id,
        ProfileChanges { role: Some(role.as_str().to_string()), ..Default::default() },
    )
    .expect("update role")
}

pub fn befriend(conn: &mut PgConnection, a: Uuid, b: Uuid) {
    use quad_social::services::friend_service;
    let request = friend_service::send_request(conn, a, b).expect("send request");
    friend_service::accept(conn, request.id, b).expect("accept request");
}
