use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use uuid::Uuid;

use loadbench_core::{BenchError, BenchResult, OperationMix, ServiceRunSpec, ServiceTarget};

use crate::{ProbeOutcome, ServiceProbe};

/// Probe for mounted file storage (NFS, local disk, anything with a path).
///
/// Write/read/stat/delete plain files under `root_dir`. Written paths are
/// tracked in a shared ring so the other operations target live files,
/// falling back to a write when none exist yet.
pub struct FileStorageProbe {
    service_name: String,
    root_dir: PathBuf,
    payload: Vec<u8>,
    mix: OperationMix,
    files: Mutex<Vec<PathBuf>>,
}

impl FileStorageProbe {
    pub fn from_spec(spec: &ServiceRunSpec) -> BenchResult<Self> {
        let ServiceTarget::FileStorage {
            root_dir,
            file_size_bytes,
            operation_mix,
        } = &spec.target
        else {
            return Err(BenchError::config("spec is not a file-storage target"));
        };

        Ok(Self {
            service_name: spec.service_name.clone(),
            root_dir: root_dir.clone(),
            payload: vec![0x42u8; *file_size_bytes],
            mix: operation_mix.clone(),
            files: Mutex::new(Vec::new()),
        })
    }

    fn take_existing_file(&self) -> Option<PathBuf> {
        let mut files = self.files.lock();
        if files.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..files.len());
        Some(files.swap_remove(idx))
    }

    async fn write(&self) -> BenchResult<ProbeOutcome> {
        let path = self.root_dir.join(format!("bench-{}.dat", Uuid::new_v4()));
        tokio::fs::write(&path, &self.payload).await?;
        let bytes = self.payload.len() as u64;
        self.files.lock().push(path);
        Ok(ProbeOutcome::op("write", bytes))
    }

    async fn read(&self) -> BenchResult<ProbeOutcome> {
        let Some(path) = self.take_existing_file() else {
            return self.write().await;
        };
        let contents = tokio::fs::read(&path).await?;
        self.files.lock().push(path);
        Ok(ProbeOutcome::op("read", contents.len() as u64))
    }

    async fn stat(&self) -> BenchResult<ProbeOutcome> {
        let Some(path) = self.take_existing_file() else {
            return self.write().await;
        };
        let meta = tokio::fs::metadata(&path).await?;
        self.files.lock().push(path);
        Ok(ProbeOutcome::op("stat", meta.len()))
    }

    async fn delete(&self) -> BenchResult<ProbeOutcome> {
        let Some(path) = self.take_existing_file() else {
            return self.write().await;
        };
        tokio::fs::remove_file(&path).await?;
        Ok(ProbeOutcome::op("delete", 0))
    }
}

#[async_trait]
impl ServiceProbe for FileStorageProbe {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    async fn setup(&self) -> BenchResult<()> {
        tokio::fs::create_dir_all(&self.root_dir).await?;
        Ok(())
    }

    async fn call(&self) -> BenchResult<ProbeOutcome> {
        let op = {
            let mut rng = rand::thread_rng();
            self.mix.sample(&mut rng).to_string()
        };
        match op.as_str() {
            "write" => self.write().await,
            "read" => self.read().await,
            "stat" => self.stat().await,
            "delete" => self.delete().await,
            other => Err(BenchError::config(format!(
                "unsupported file operation `{other}`"
            ))),
        }
    }
}
