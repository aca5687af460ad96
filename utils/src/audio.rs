use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

pub fn create_resampler(in_sampling_rate: f64, out_sampling_rate: f64, chunk_size: usize) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

/// Averages interleaved frames down to one channel.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples.iter()
        .map(|&sample| (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter()
        .map(|&sample| (sample as f32 / i16::MAX as f32).clamp(-1.0, 1.0))
        .collect()
}

/// Resamples an unbounded mono stream that arrives in arbitrarily sized pieces.
///
/// Input is buffered until a full resampler chunk is available; leftovers wait
/// for the next call.
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    chunk_size: usize,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_sampling_rate: f64, out_sampling_rate: f64, chunk_size: usize) -> anyhow::Result<Self> {
        Ok(Self {
            resampler: create_resampler(in_sampling_rate, out_sampling_rate, chunk_size)?,
            chunk_size,
            pending: Vec::with_capacity(chunk_size * 2),
        })
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        self.pending.extend_from_slice(samples);

        let mut resampled = Vec::new();
        while self.pending.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_size).collect();
            match self.resampler.process(&[chunk.as_slice()], None) {
                Ok(out) => {
                    if let Some(channel) = out.first() {
                        resampled.extend_from_slice(channel);
                    }
                }
                Err(e) => tracing::warn!("failed to resample chunk: {}", e),
            }
        }
        resampled
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let mono = downmix(&[1.0, 0.0, 0.5, 0.5], 2);
        assert_eq!(mono, vec![0.5, 0.5]);

        assert_eq!(downmix(&[0.25, 0.75], 1), vec![0.25, 0.75]);
    }

    #[test]
    fn pcm16_conversion_clamps() {
        let pcm = f32_to_pcm16(&[2.0, -2.0, 0.0]);
        assert_eq!(pcm, vec![i16::MAX, -i16::MAX, 0]);

        let back = pcm16_to_f32(&[i16::MAX, i16::MIN]);
        assert_eq!(back, vec![1.0, -1.0]);
    }

    #[test]
    fn stream_resampler_buffers_partial_chunks() {
        let mut resampler = StreamResampler::new(48000.0, 16000.0, 480).unwrap();

        assert!(resampler.process(&[0.0; 100]).is_empty());
        assert_eq!(resampler.pending_len(), 100);

        let out = resampler.process(&[0.0; 860]);
        assert!(!out.is_empty());
        assert_eq!(resampler.pending_len(), 0);
    }
}
