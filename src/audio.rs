use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Result, ensure};
use bytes::{BufMut, Bytes, BytesMut};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

pub const SAMPLE_RATE: u32 = 8000;

/// Samples per media packet: one 20ms frame at 8kHz.
pub const FRAME_SAMPLES: usize = 160;

fn stream_spec() -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Reads a WAV file frame by frame for the sender cadence.
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
}

impl WavSource {
    /// Opens a source file, rejecting anything that is not 16-bit mono
    /// PCM at 8kHz.
    pub fn open(path: &Path) -> Result<Self> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();

        ensure!(
            spec == stream_spec(),
            "unsupported wav format: need 16-bit mono pcm at {SAMPLE_RATE}Hz"
        );

        Ok(Self { reader })
    }

    /// Next frame as little-endian sample bytes, `None` once the file is
    /// exhausted. The last frame may be short.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let mut frame = BytesMut::with_capacity(FRAME_SAMPLES * 2);
        for sample in self.reader.samples::<i16>().take(FRAME_SAMPLES) {
            frame.put_i16_le(sample.ok()?);
        }

        if frame.is_empty() {
            return None;
        }

        Some(frame.freeze())
    }
}

/// Writes delivered payloads back into a WAV file with the stream
/// parameters.
pub struct WavSink {
    writer: Option<WavWriter<std::io::BufWriter<File>>>,
}

impl WavSink {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: Some(WavWriter::create(path, stream_spec())?),
        })
    }

    /// Appends one payload of little-endian samples. A trailing odd byte
    /// cannot be a sample and is dropped.
    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        for sample in payload.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
        }

        Ok(())
    }

    /// Flushes the sample count into the header. Without this the file
    /// is left with a zero-length data chunk.
    pub fn finalize(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }

        Ok(())
    }
}
