//! Match and episode recording (spec.md §4.10).
//!
//! `MatchLogger` appends one NDJSON line per formed group to a per-run log
//! file; `ExportSink` writes one opaque byte buffer per episode per subject.
//! Both are append-only and never read back by the engine itself.

use std::path::PathBuf;

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ids::{GameId, SceneId, SubjectId};

#[derive(Debug, Serialize)]
struct MatchLogEntry<'a> {
    game_id: GameId,
    scene_id: &'a SceneId,
    members: &'a [SubjectId],
    group_key: Uuid,
    formed_at: chrono::DateTime<chrono::Utc>,
}

/// Append-only NDJSON record of every game formed during a run.
pub struct MatchLogger {
    path: PathBuf,
    file: Mutex<Option<fs::File>>,
}

impl MatchLogger {
    /// `data/{experiment_id}/match_logs/<run_id>.log`, per spec.md's
    /// persisted-state layout.
    #[must_use]
    pub fn new(data_dir: &str, experiment_id: &str, run_id: Uuid) -> Self {
        let path = PathBuf::from(data_dir)
            .join(experiment_id)
            .join("match_logs")
            .join(format!("{run_id}.log"));
        Self {
            path,
            file: Mutex::new(None),
        }
    }

    async fn file(&self) -> anyhow::Result<tokio::fs::File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(Into::into)
    }

    /// Appends one line recording a newly formed game. Never fails the
    /// caller's join path: logging errors are reported but do not block
    /// gameplay (spec.md's persisted state has "no restart durability
    /// required").
    pub async fn record_game(
        &self,
        game_id: GameId,
        scene_id: &SceneId,
        members: &[SubjectId],
        group_key: Uuid,
        formed_at: chrono::DateTime<chrono::Utc>,
    ) {
        let entry = MatchLogEntry {
            game_id,
            scene_id,
            members,
            group_key,
            formed_at,
        };
        let Ok(mut line) = serde_json::to_vec(&entry) else {
            tracing::error!("failed to serialize match log entry for game {game_id}");
            return;
        };
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            match self.file().await {
                Ok(file) => *guard = Some(file),
                Err(error) => {
                    tracing::error!(%error, path = %self.path.display(), "failed to open match log");
                    return;
                }
            }
        }
        if let Some(file) = guard.as_mut() {
            if let Err(error) = file.write_all(&line).await {
                tracing::error!(%error, path = %self.path.display(), "failed to append match log entry");
                *guard = None;
            }
        }
    }
}

/// Per-episode opaque export of a single subject's recorded trace.
pub struct ExportSink {
    data_dir: PathBuf,
    experiment_id: String,
}

impl ExportSink {
    #[must_use]
    pub fn new(data_dir: &str, experiment_id: &str) -> Self {
        Self {
            data_dir: PathBuf::from(data_dir),
            experiment_id: experiment_id.to_string(),
        }
    }

    fn episode_path(&self, scene_id: &SceneId, subject_id: SubjectId, episode_id: Uuid) -> PathBuf {
        self.data_dir
            .join(&self.experiment_id)
            .join(scene_id.as_str())
            .join(format!("{subject_id}-{episode_id}.bin"))
    }

    /// Writes one episode's opaque byte buffer for one subject. The
    /// engine never interprets `payload` -- it's whatever the runtime
    /// module serialized (spec.md: "format opaque").
    pub async fn write_episode(
        &self,
        scene_id: &SceneId,
        subject_id: SubjectId,
        episode_id: Uuid,
        payload: &[u8],
    ) -> anyhow::Result<()> {
        let path = self.episode_path(scene_id, subject_id, episode_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn match_logger_appends_ndjson_lines() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = Uuid::new_v4();
        let logger = MatchLogger::new(dir.path().to_str().unwrap(), "exp-1", run_id);

        let scene: SceneId = "main".into();
        let members = vec![SubjectId::new(), SubjectId::new()];
        logger
            .record_game(GameId::new(), &scene, &members, Uuid::new_v4(), chrono::Utc::now())
            .await;
        logger
            .record_game(GameId::new(), &scene, &members, Uuid::new_v4(), chrono::Utc::now())
            .await;

        let path = dir.path().join("exp-1").join("match_logs").join(format!("{run_id}.log"));
        let contents = tokio::fs::read_to_string(path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["scene_id"], "main");
        }
    }

    #[tokio::test]
    async fn export_sink_writes_one_file_per_episode_per_subject() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ExportSink::new(dir.path().to_str().unwrap(), "exp-1");
        let scene: SceneId = "main".into();
        let subject = SubjectId::new();
        let episode = Uuid::new_v4();

        sink.write_episode(&scene, subject, episode, b"payload-bytes").await.unwrap();

        let path = dir
            .path()
            .join("exp-1")
            .join("main")
            .join(format!("{subject}-{episode}.bin"));
        let contents = tokio::fs::read(path).await.unwrap();
        assert_eq!(contents, b"payload-bytes");
    }
}
