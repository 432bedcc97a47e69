use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{info, instrument};
use uuid::Uuid;

use tempo_core::{permissions, AccountId, Action, ActorId, Clock, PermissionGate, Subject};

use crate::assembler::{FunctionSource, JobAssembler};
use crate::db::init_db;
use crate::error::{LedgerError, Result};
use crate::ledger::record_version_in;
use crate::types::{FunctionRecord, Version};

/// Write path for a job's functions.
///
/// Every mutation runs as one transaction: store the body, append the
/// function-level version, retarget the function pointer, then rebuild the
/// job's executable unit through the injected assembler and append the
/// job-level version. An assembler refusal rolls all of it back, so a
/// scheduler tick can never observe a current version without a matching
/// assembled unit.
pub struct FunctionStore {
    db: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    gate: Arc<dyn PermissionGate>,
    assembler: Arc<dyn JobAssembler>,
}

impl FunctionStore {
    /// Wrap a connection, initialising the ledger and content schemas.
    pub fn new(
        conn: Connection,
        clock: Arc<dyn Clock>,
        gate: Arc<dyn PermissionGate>,
        assembler: Arc<dyn JobAssembler>,
    ) -> Result<Self> {
        tempo_content::db::init_db(&conn)?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            clock,
            gate,
            assembler,
        })
    }

    /// Create or update a named function. Returns the new function version.
    #[instrument(skip(self, source), fields(account = %account, job_id, name))]
    pub fn save_function(
        &self,
        account: &AccountId,
        actor: &ActorId,
        job_id: &str,
        name: &str,
        source: &str,
        description: &str,
    ) -> Result<Version> {
        permissions::ensure(self.gate.as_ref(), actor, Action::Edit, &job_resource(job_id))?;

        let now = self.clock.now();
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;

        let existing = live_function_in(&tx, account, job_id, name)?;
        let function_id = match &existing {
            Some(row) => row.id.clone(),
            None => Uuid::now_v7().to_string(),
        };

        let subject = Subject::function(function_id.as_str());
        let version = record_version_in(&tx, now, account, &subject, source, description, actor)?;

        let now_str = now.to_rfc3339();
        match existing {
            Some(_) => {
                tx.execute(
                    "UPDATE functions SET content_hash = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![version.content_hash, now_str, function_id],
                )?;
            }
            None => {
                tx.execute(
                    "INSERT INTO functions
                     (id, account_id, job_id, name, content_hash, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    rusqlite::params![
                        function_id,
                        account.as_str(),
                        job_id,
                        name,
                        version.content_hash,
                        now_str
                    ],
                )?;
            }
        }

        self.reassemble_in(&tx, now, account, actor, job_id)?;
        tx.commit()?;

        info!(job_id, name, version = version.version_number, "function saved");
        Ok(version)
    }

    /// Restore an old function version by appending a new one that points at
    /// its content, then rebuild the job unit.
    ///
    /// The restored pointer takes its own content reference on top of the
    /// rollback version's, so the target hash ends up referenced twice.
    #[instrument(skip(self), fields(account = %account, job_id, name, target))]
    pub fn rollback_function(
        &self,
        account: &AccountId,
        actor: &ActorId,
        job_id: &str,
        name: &str,
        target: i64,
    ) -> Result<Version> {
        permissions::ensure(self.gate.as_ref(), actor, Action::Edit, &job_resource(job_id))?;

        let now = self.clock.now();
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;

        let function =
            live_function_in(&tx, account, job_id, name)?.ok_or_else(|| {
                LedgerError::FunctionNotFound {
                    job_id: job_id.to_string(),
                    name: name.to_string(),
                }
            })?;

        let subject = Subject::function(function.id.as_str());
        let target_hash: String = tx
            .query_row(
                "SELECT content_hash FROM versions
                 WHERE account_id = ?1 AND subject_kind = 'function'
                   AND subject_id = ?2 AND version_number = ?3",
                rusqlite::params![account.as_str(), function.id, target],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => LedgerError::VersionNotFound {
                    subject: subject.to_string(),
                    number: target,
                },
                other => LedgerError::Database(other),
            })?;
        let source =
            tempo_content::get_in(&tx, account, tempo_core::SubjectKind::Function, &target_hash)?;

        let version = record_version_in(
            &tx,
            now,
            account,
            &subject,
            &source,
            &format!("rollback to v{target}"),
            actor,
        )?;
        // Pointer re-reference: the restored body is live both as the new
        // current version and as the function's target.
        tempo_content::put_in(&tx, account, tempo_core::SubjectKind::Function, &source)?;

        tx.execute(
            "UPDATE functions SET content_hash = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![version.content_hash, now.to_rfc3339(), function.id],
        )?;

        self.reassemble_in(&tx, now, account, actor, job_id)?;
        tx.commit()?;

        info!(job_id, name, target, new_version = version.version_number, "function rolled back");
        Ok(version)
    }

    /// Soft-delete a function and rebuild the job unit without it.
    #[instrument(skip(self), fields(account = %account, job_id, name))]
    pub fn delete_function(
        &self,
        account: &AccountId,
        actor: &ActorId,
        job_id: &str,
        name: &str,
    ) -> Result<()> {
        permissions::ensure(self.gate.as_ref(), actor, Action::Edit, &job_resource(job_id))?;

        let now = self.clock.now();
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;

        let function =
            live_function_in(&tx, account, job_id, name)?.ok_or_else(|| {
                LedgerError::FunctionNotFound {
                    job_id: job_id.to_string(),
                    name: name.to_string(),
                }
            })?;

        tx.execute(
            "UPDATE functions SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now.to_rfc3339(), function.id],
        )?;
        // The pointer's live reference goes with it; version history stays.
        tempo_content::release_in(
            &tx,
            account,
            tempo_core::SubjectKind::Function,
            &function.content_hash,
        )?;

        self.reassemble_in(&tx, now, account, actor, job_id)?;
        tx.commit()?;

        info!(job_id, name, "function deleted");
        Ok(())
    }

    /// Current source text of a named function.
    pub fn get_source(&self, account: &AccountId, job_id: &str, name: &str) -> Result<String> {
        let conn = self.db.lock().unwrap();
        let function =
            live_function_in(&conn, account, job_id, name)?.ok_or_else(|| {
                LedgerError::FunctionNotFound {
                    job_id: job_id.to_string(),
                    name: name.to_string(),
                }
            })?;
        Ok(tempo_content::get_in(
            &conn,
            account,
            tempo_core::SubjectKind::Function,
            &function.content_hash,
        )?)
    }

    /// All live functions of a job, ordered by name.
    pub fn list_functions(&self, account: &AccountId, job_id: &str) -> Result<Vec<FunctionRecord>> {
        let conn = self.db.lock().unwrap();
        list_functions_in(&conn, account, job_id)
    }

    /// The job's currently assembled executable unit.
    pub fn assembled_unit(&self, account: &AccountId, job_id: &str) -> Result<String> {
        let conn = self.db.lock().unwrap();
        let subject = Subject::job(job_id);
        let current = crate::ledger::current_version_in(&conn, account, &subject)?.ok_or_else(
            || LedgerError::NotFound {
                subject: subject.to_string(),
            },
        )?;
        Ok(tempo_content::get_in(
            &conn,
            account,
            tempo_core::SubjectKind::Job,
            &current.content_hash,
        )?)
    }

    /// Rebuild the job's unit from its live functions and append the
    /// job-level version. Runs inside the caller's transaction.
    fn reassemble_in(
        &self,
        conn: &Connection,
        now: chrono::DateTime<chrono::Utc>,
        account: &AccountId,
        actor: &ActorId,
        job_id: &str,
    ) -> Result<Version> {
        let functions = list_functions_in(conn, account, job_id)?;
        let mut sources = Vec::with_capacity(functions.len());
        for function in &functions {
            let source = tempo_content::get_in(
                conn,
                account,
                tempo_core::SubjectKind::Function,
                &function.content_hash,
            )?;
            sources.push(FunctionSource {
                name: function.name.clone(),
                source,
            });
        }

        let unit = self.assembler.assemble(job_id, &sources)?;
        record_version_in(
            conn,
            now,
            account,
            &Subject::job(job_id),
            &unit,
            &format!("assembled from {} functions", sources.len()),
            actor,
        )
    }
}

fn job_resource(job_id: &str) -> String {
    format!("job:{job_id}")
}

fn live_function_in(
    conn: &Connection,
    account: &AccountId,
    job_id: &str,
    name: &str,
) -> Result<Option<FunctionRecord>> {
    match conn.query_row(
        "SELECT id, job_id, name, content_hash, created_at, updated_at
         FROM functions
         WHERE account_id = ?1 AND job_id = ?2 AND name = ?3 AND deleted_at IS NULL",
        rusqlite::params![account.as_str(), job_id, name],
        row_to_function,
    ) {
        Ok(row) => Ok(Some(row)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(LedgerError::Database(e)),
    }
}

fn list_functions_in(
    conn: &Connection,
    account: &AccountId,
    job_id: &str,
) -> Result<Vec<FunctionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, job_id, name, content_hash, created_at, updated_at
         FROM functions
         WHERE account_id = ?1 AND job_id = ?2 AND deleted_at IS NULL
         ORDER BY name",
    )?;
    let rows = stmt.query_map(rusqlite::params![account.as_str(), job_id], row_to_function)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn row_to_function(row: &rusqlite::Row<'_>) -> rusqlite::Result<FunctionRecord> {
    Ok(FunctionRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        name: row.get(2)?,
        content_hash: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    use tempo_core::{AllowAll, FixedClock, SubjectKind};

    use crate::assembler::{AssemblyError, SectionAssembler};

    struct RefusingAssembler;

    impl JobAssembler for RefusingAssembler {
        fn assemble(
            &self,
            _job_id: &str,
            _functions: &[FunctionSource],
        ) -> std::result::Result<String, AssemblyError> {
            Err(AssemblyError::new("codegen rejected the unit"))
        }
    }

    fn store_with(assembler: Arc<dyn JobAssembler>) -> FunctionStore {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        FunctionStore::new(conn, clock, Arc::new(AllowAll), assembler).expect("init store")
    }

    fn store() -> FunctionStore {
        store_with(Arc::new(SectionAssembler))
    }

    fn acct() -> AccountId {
        AccountId::new("acct-1")
    }

    fn actor() -> ActorId {
        ActorId::new("u-1")
    }

    #[test]
    fn save_creates_function_and_assembles_unit() {
        let store = store();
        let v = store
            .save_function(&acct(), &actor(), "job-1", "execute", "run();\n", "initial")
            .unwrap();
        assert_eq!(v.version_number, 1);

        let unit = store.assembled_unit(&acct(), "job-1").unwrap();
        assert!(unit.contains("run();"));
        assert!(unit.contains("execute"));

        let functions = store.list_functions(&acct(), "job-1").unwrap();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].content_hash, v.content_hash);
    }

    #[test]
    fn update_retargets_pointer_without_new_row() {
        let store = store();
        store
            .save_function(&acct(), &actor(), "job-1", "execute", "old();\n", "v1")
            .unwrap();
        let v2 = store
            .save_function(&acct(), &actor(), "job-1", "execute", "new();\n", "v2")
            .unwrap();
        assert_eq!(v2.version_number, 2);

        let functions = store.list_functions(&acct(), "job-1").unwrap();
        assert_eq!(functions.len(), 1, "update must not create a second row");
        assert_eq!(functions[0].content_hash, v2.content_hash);
        assert_eq!(store.get_source(&acct(), "job-1", "execute").unwrap(), "new();\n");
    }

    #[test]
    fn unit_includes_every_live_function() {
        let store = store();
        store
            .save_function(&acct(), &actor(), "job-1", "execute", "run();\n", "v1")
            .unwrap();
        store
            .save_function(&acct(), &actor(), "job-1", "set_up", "init();\n", "v1")
            .unwrap();

        let unit = store.assembled_unit(&acct(), "job-1").unwrap();
        assert!(unit.contains("run();"));
        assert!(unit.contains("init();"));

        // The job-level subject versioned once per mutation.
        let job_subject = Subject::job("job-1");
        let conn = store.db.lock().unwrap();
        let current = crate::ledger::current_version_in(&conn, &acct(), &job_subject)
            .unwrap()
            .expect("job unit version");
        assert_eq!(current.version_number, 2);
    }

    #[test]
    fn assembler_failure_rolls_back_everything() {
        let store = store_with(Arc::new(RefusingAssembler));
        let err = store
            .save_function(&acct(), &actor(), "job-1", "execute", "run();\n", "v1")
            .unwrap_err();
        assert!(matches!(err, LedgerError::Assembly(_)));

        // Nothing committed: no function row, no version, no content.
        assert!(store.list_functions(&acct(), "job-1").unwrap().is_empty());
        let conn = store.db.lock().unwrap();
        let subject = Subject::function("any");
        assert!(crate::ledger::current_version_in(&conn, &acct(), &subject)
            .unwrap()
            .is_none());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM content", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "content put must not survive the rollback");
    }

    #[test]
    fn previous_unit_survives_failed_update() {
        // Assembler that accepts the first build and refuses every later one.
        struct FailsAfterFirst(std::sync::atomic::AtomicUsize);
        impl JobAssembler for FailsAfterFirst {
            fn assemble(
                &self,
                job_id: &str,
                functions: &[FunctionSource],
            ) -> std::result::Result<String, AssemblyError> {
                if self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    SectionAssembler.assemble(job_id, functions)
                } else {
                    Err(AssemblyError::new("codegen rejected the unit"))
                }
            }
        }

        let store = store_with(Arc::new(FailsAfterFirst(Default::default())));
        store
            .save_function(&acct(), &actor(), "job-1", "execute", "good();\n", "v1")
            .unwrap();
        let unit_before = store.assembled_unit(&acct(), "job-1").unwrap();

        let err = store
            .save_function(&acct(), &actor(), "job-1", "execute", "bad();\n", "v2")
            .unwrap_err();
        assert!(matches!(err, LedgerError::Assembly(_)));

        assert_eq!(
            store.assembled_unit(&acct(), "job-1").unwrap(),
            unit_before,
            "previous unit stays current after a failed mutation"
        );
        assert_eq!(
            store.get_source(&acct(), "job-1", "execute").unwrap(),
            "good();\n"
        );
    }

    #[test]
    fn delete_removes_from_unit_and_releases_pointer() {
        let store = store();
        store
            .save_function(&acct(), &actor(), "job-1", "execute", "run();\n", "v1")
            .unwrap();
        let v = store
            .save_function(&acct(), &actor(), "job-1", "tear_down", "drop();\n", "v1")
            .unwrap();

        store
            .delete_function(&acct(), &actor(), "job-1", "tear_down")
            .unwrap();

        let unit = store.assembled_unit(&acct(), "job-1").unwrap();
        assert!(!unit.contains("drop();"));
        assert!(unit.contains("run();"));
        assert!(store.get_source(&acct(), "job-1", "tear_down").is_err());

        let conn = store.db.lock().unwrap();
        assert_eq!(
            tempo_content::reference_count_in(&conn, &acct(), SubjectKind::Function, &v.content_hash)
                .unwrap(),
            Some(0)
        );
    }

    #[test]
    fn deleted_name_can_be_recreated() {
        let store = store();
        store
            .save_function(&acct(), &actor(), "job-1", "execute", "one();\n", "v1")
            .unwrap();
        store
            .delete_function(&acct(), &actor(), "job-1", "execute")
            .unwrap();
        let v = store
            .save_function(&acct(), &actor(), "job-1", "execute", "two();\n", "again")
            .unwrap();
        // Fresh function row, fresh version chain.
        assert_eq!(v.version_number, 1);
        assert_eq!(store.get_source(&acct(), "job-1", "execute").unwrap(), "two();\n");
    }

    #[test]
    fn save_rollback_refcount_walk() {
        // Body "A" saved (v1, H1, rc 1), changed to "B" (v2, H2 rc 1, H1 rc 0),
        // rolled back to v1 (v3, H1 again, rc 2).
        let store = store();
        let v1 = store
            .save_function(&acct(), &actor(), "job-1", "execute", "A", "v1")
            .unwrap();
        let conn = store.db.lock().unwrap();
        assert_eq!(
            tempo_content::reference_count_in(&conn, &acct(), SubjectKind::Function, &v1.content_hash)
                .unwrap(),
            Some(1)
        );
        drop(conn);

        let v2 = store
            .save_function(&acct(), &actor(), "job-1", "execute", "B", "v2")
            .unwrap();
        let conn = store.db.lock().unwrap();
        assert_eq!(
            tempo_content::reference_count_in(&conn, &acct(), SubjectKind::Function, &v2.content_hash)
                .unwrap(),
            Some(1)
        );
        assert_eq!(
            tempo_content::reference_count_in(&conn, &acct(), SubjectKind::Function, &v1.content_hash)
                .unwrap(),
            Some(0)
        );
        drop(conn);

        let v3 = store
            .rollback_function(&acct(), &actor(), "job-1", "execute", 1)
            .unwrap();
        assert_eq!(v3.version_number, 3);
        assert_eq!(v3.content_hash, v1.content_hash);
        let conn = store.db.lock().unwrap();
        assert_eq!(
            tempo_content::reference_count_in(&conn, &acct(), SubjectKind::Function, &v1.content_hash)
                .unwrap(),
            Some(2)
        );
    }

    #[test]
    fn permission_gate_blocks_edits() {
        struct DenyAll;
        impl tempo_core::PermissionGate for DenyAll {
            fn can_perform(&self, _: &ActorId, _: Action, _: &str) -> bool {
                false
            }
        }

        let conn = Connection::open_in_memory().expect("open in-memory db");
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let store =
            FunctionStore::new(conn, clock, Arc::new(DenyAll), Arc::new(SectionAssembler))
                .expect("init store");

        let err = store
            .save_function(&acct(), &actor(), "job-1", "execute", "x", "v1")
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(tempo_core::CoreError::PermissionDenied { .. })
        ));
    }
}
