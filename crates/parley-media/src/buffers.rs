/// Per-question media accumulation, owned exclusively by the session task.
///
/// Audio chunks are decoded PCM; frames are decoded JPEG bytes. Both are
/// append-only for the lifetime of one question and handed off as a
/// snapshot at flush, so a frame arriving after the flush belongs to the
/// next question.
#[derive(Debug, Default)]
pub struct QuestionBuffers {
    audio: Vec<Vec<u8>>,
    frames: Vec<Vec<u8>>,
}

/// Snapshot taken at question flush; ownership moves to the muxer.
#[derive(Debug, Default)]
pub struct BufferSnapshot {
    pub audio: Vec<Vec<u8>>,
    pub frames: Vec<Vec<u8>>,
}

impl QuestionBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_audio(&mut self, pcm: Vec<u8>) {
        self.audio.push(pcm);
    }

    pub fn push_frame(&mut self, jpeg: Vec<u8>) {
        self.frames.push(jpeg);
    }

    pub fn audio_chunks(&self) -> usize {
        self.audio.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty() && self.frames.is_empty()
    }

    /// Move the accumulated media out and leave both buffers empty.
    pub fn take(&mut self) -> BufferSnapshot {
        BufferSnapshot {
            audio: std::mem::take(&mut self.audio),
            frames: std::mem::take(&mut self.frames),
        }
    }

    pub fn clear(&mut self) {
        self.audio.clear();
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_clears_both_buffers() {
        let mut buffers = QuestionBuffers::new();
        buffers.push_audio(vec![0u8; 320]);
        buffers.push_audio(vec![1u8; 320]);
        buffers.push_frame(vec![0xFF, 0xD8]);

        let snapshot = buffers.take();
        assert_eq!(snapshot.audio.len(), 2);
        assert_eq!(snapshot.frames.len(), 1);
        assert!(buffers.is_empty());
    }

    #[test]
    fn chunk_order_is_preserved() {
        let mut buffers = QuestionBuffers::new();
        for i in 0u8..5 {
            buffers.push_audio(vec![i]);
        }
        let snapshot = buffers.take();
        let order: Vec<u8> = snapshot.audio.iter().map(|c| c[0]).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn frames_pushed_after_take_belong_to_next_question() {
        let mut buffers = QuestionBuffers::new();
        buffers.push_frame(vec![1]);
        let first = buffers.take();
        buffers.push_frame(vec![2]);
        assert_eq!(first.frames, vec![vec![1]]);
        assert_eq!(buffers.frame_count(), 1);
    }
}
