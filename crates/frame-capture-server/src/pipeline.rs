//! End-of-session pipeline: sequence, encode, clean up.

use std::path::PathBuf;

use thiserror::Error;

use crate::assembler::{AssemblyError, VideoAssembler};
use crate::sequencer::{SequenceError, sort_frame_files};
use crate::session_dir::SessionDir;

/// A successfully produced video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledVideo {
    pub path: PathBuf,
    pub frames: usize,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sequence frames: {0}")]
    Sequence(#[from] SequenceError),
    #[error("sequencer task aborted: {0}")]
    SequencerTask(String),
    #[error("assemble {frames} frames: {source}")]
    Assembly {
        frames: usize,
        source: AssemblyError,
    },
}

async fn sequence_and_assemble(
    dir: &SessionDir,
    assembler: &dyn VideoAssembler,
) -> Result<AssembledVideo, PipelineError> {
    let frames_dir = dir.path().to_path_buf();
    let frames = tokio::task::spawn_blocking(move || sort_frame_files(&frames_dir))
        .await
        .map_err(|err| PipelineError::SequencerTask(err.to_string()))??;
    tracing::info!(
        session_id = %dir.session_id(),
        frames,
        "frames sequenced"
    );

    let video = dir.video_path();
    assembler
        .assemble(dir.path(), frames, &video)
        .await
        .map_err(|source| PipelineError::Assembly { frames, source })?;
    Ok(AssembledVideo {
        path: video,
        frames,
    })
}

/// Run the whole pipeline for a finished session.
///
/// The frame directory is removed whatever the outcome; the video artifact
/// lives outside it and is never touched here.
pub async fn finalize_session(
    dir: &SessionDir,
    assembler: &dyn VideoAssembler,
) -> Result<AssembledVideo, PipelineError> {
    let result = sequence_and_assemble(dir, assembler).await;
    dir.remove().await;
    result
}


#[cfg(test)]
mod tests {
    use super::fakes::RecordingAssembler;
    use super::*;
    use crate::session_dir::test_support::scratch_root;

    #[actix_web::test]
    async fn sequences_encodes_and_cleans_up() {
        let root = scratch_root("pipeline-ok");
        let dir = SessionDir::create(&root, "s1").await.unwrap();
        for key in [5u64, 3, 8] {
            std::fs::write(dir.path().join(format!("{key}.png")), format!("k{key}")).unwrap();
        }
        let assembler = RecordingAssembler::default();

        let video = finalize_session(&dir, &assembler).await.unwrap();

        assert_eq!(video.frames, 3);
        assert_eq!(video.path, root.join("s1.mp4"));
        assert!(video.path.exists());
        assert!(!dir.path().exists());
        let calls = assembler.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].frames_dir, dir.path());
        assert_eq!(calls[0].frames, vec![b"k3".to_vec(), b"k5".to_vec(), b"k8".to_vec()]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[actix_web::test]
    async fn assembly_failure_still_cleans_up() {
        let root = scratch_root("pipeline-fail");
        let dir = SessionDir::create(&root, "s2").await.unwrap();
        std::fs::write(dir.path().join("1.png"), b"x").unwrap();
        let assembler = RecordingAssembler::failing();

        let err = finalize_session(&dir, &assembler).await.unwrap_err();

        assert!(matches!(err, PipelineError::Assembly { frames: 1, .. }));
        assert!(!dir.path().exists());
        assert!(!dir.video_path().exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[actix_web::test]
    async fn empty_session_fails_explicitly() {
        let root = scratch_root("pipeline-empty");
        let dir = SessionDir::create(&root, "s3").await.unwrap();
        let assembler = RecordingAssembler::default();

        let err = finalize_session(&dir, &assembler).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Assembly {
                frames: 0,
                source: AssemblyError::NoFrames
            }
        ));
        assert!(!dir.path().exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[actix_web::test]
    async fn missing_directory_is_a_sequence_error() {
        let root = scratch_root("pipeline-missing");
        let dir = SessionDir::create(&root, "s4").await.unwrap();
        std::fs::remove_dir_all(dir.path()).unwrap();
        let assembler = RecordingAssembler::default();

        let err = finalize_session(&dir, &assembler).await.unwrap_err();

        assert!(matches!(err, PipelineError::Sequence(_)));
        assert!(assembler.calls().is_empty());
        let _ = std::fs::remove_dir_all(&root);
    }
}
