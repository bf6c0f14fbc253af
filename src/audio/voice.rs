/// Synthesized tones and the mixer that renders them at exact frame offsets
/// Hard cap so the audio callback never allocates
pub const MAX_VOICES: usize = 256;

/// Gain envelope of a single tone, in seconds from its start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneEnvelope {
    pub peak: f32,
    pub floor: f32,
    pub attack: f64,
    pub decay_end: f64,
    pub stop: f64,
}

impl Default for ToneEnvelope {
    fn default() -> Self {
        Self {
            peak: 0.3,
            floor: 0.001,
            attack: 0.01,
            decay_end: 0.4,
            stop: 0.45,
        }
    }
}

impl ToneEnvelope {
    /// Linear rise to `peak`, exponential fall to `floor` by `decay_end`,
    /// held at `floor` until `stop`, silent outside that span.
    pub fn gain_at(&self, t: f64) -> f32 {
        if t < 0.0 || t >= self.stop {
            0.0
        } else if t < self.attack {
            self.peak * (t / self.attack) as f32
        } else if t < self.decay_end {
            let progress = ((t - self.attack) / (self.decay_end - self.attack)) as f32;
            self.peak * (self.floor / self.peak).powf(progress)
        } else {
            self.floor
        }
    }
}

/// Triangle wave for a phase in [0, 1)
pub fn triangle(phase: f32) -> f32 {
    4.0 * (phase - (phase + 0.5).floor()).abs() - 1.0
}

/// A tone waiting for, or in the middle of, playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency: f32,
    pub start_frame: u64,
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    tone: Tone,
    phase: f32,
}

pub struct Mixer {
    sample_rate: f32,
    envelope: ToneEnvelope,
    voices: Vec<Voice>,
    frame: u64,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            envelope: ToneEnvelope::default(),
            voices: Vec::with_capacity(MAX_VOICES),
            frame: 0,
        }
    }

    /// Frames rendered so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Queues a tone. A start frame already rendered is moved to the next one.
    pub fn schedule(&mut self, mut tone: Tone) {
        tone.start_frame = tone.start_frame.max(self.frame);
        let voice = Voice { tone, phase: 0.0 };
        if self.voices.len() < MAX_VOICES {
            self.voices.push(voice);
        } else if let Some(oldest) = self
            .voices
            .iter_mut()
            .min_by_key(|v| v.tone.start_frame)
        {
            *oldest = voice;
        }
    }

    /// Mixes all voices into an interleaved buffer of `channels` channels.
    pub fn render(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let n_frames = data.len() / channels;
        let block_start = self.frame;
        let stop_frames = (self.envelope.stop * self.sample_rate as f64).ceil() as u64;

        data.iter_mut().for_each(|s| *s = 0.0);

        for voice in &mut self.voices {
            let phase_inc = voice.tone.frequency / self.sample_rate;
            for (i, frame) in data.chunks_exact_mut(channels).enumerate() {
                let absolute = block_start + i as u64;
                if absolute < voice.tone.start_frame {
                    continue;
                }
                let t = (absolute - voice.tone.start_frame) as f64 / self.sample_rate as f64;
                let sample = triangle(voice.phase) * self.envelope.gain_at(t);
                for out in frame.iter_mut() {
                    *out += sample;
                }
                voice.phase += phase_inc;
                if voice.phase >= 1.0 {
                    voice.phase -= 1.0;
                }
            }
        }

        self.frame = block_start + n_frames as u64;
        let now = self.frame;
        self.voices
            .retain(|v| v.tone.start_frame + stop_frames > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let env = ToneEnvelope::default();
        assert_eq!(env.gain_at(-0.001), 0.0);
        assert_eq!(env.gain_at(0.0), 0.0);
        assert!((env.gain_at(0.005) - 0.15).abs() < 1e-4);
        assert!((env.gain_at(0.01) - 0.3).abs() < 1e-4);
        assert!(env.gain_at(0.2) < env.gain_at(0.1));
        assert!((env.gain_at(0.41) - 0.001).abs() < 1e-6);
        assert_eq!(env.gain_at(0.45), 0.0);
    }

    #[test]
    fn test_triangle_range() {
        assert!((triangle(0.0) + 1.0).abs() < 1e-6);
        assert!((triangle(0.5) - 1.0).abs() < 1e-6);
        assert!((triangle(0.25)).abs() < 1e-6);
    }

    #[test]
    fn test_tone_is_silent_until_start_frame() {
        let mut mixer = Mixer::new(1000);
        mixer.schedule(Tone { frequency: 100.0, start_frame: 50 });

        let mut block = vec![0.0f32; 64];
        mixer.render(&mut block, 1);
        assert!(block[..51].iter().all(|s| *s == 0.0));
        assert!(block[51..].iter().any(|s| *s != 0.0));
        assert_eq!(mixer.frame(), 64);
    }

    #[test]
    fn test_voice_freed_after_stop() {
        let mut mixer = Mixer::new(1000);
        mixer.schedule(Tone { frequency: 100.0, start_frame: 0 });
        let mut block = vec![0.0f32; 2 * 400];
        mixer.render(&mut block, 2);
        assert_eq!(mixer.active_voices(), 1);
        mixer.render(&mut block, 2);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_late_tone_starts_immediately() {
        let mut mixer = Mixer::new(1000);
        let mut block = vec![0.0f32; 100];
        mixer.render(&mut block, 1);
        mixer.schedule(Tone { frequency: 100.0, start_frame: 10 });
        mixer.render(&mut block, 1);
        assert!(block[1..20].iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_full_pool_replaces_oldest() {
        let mut mixer = Mixer::new(1000);
        for i in 0..MAX_VOICES as u64 + 1 {
            mixer.schedule(Tone { frequency: 100.0, start_frame: i });
        }
        assert_eq!(mixer.active_voices(), MAX_VOICES);
    }
}
