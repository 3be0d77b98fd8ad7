//! Uniform draws from an explicitly passed generator.
use rand::{Rng, RngCore};

/// One Uniform(0, 1) draw. Every other random quantity in the moves is derived from
/// these draws or from the same generator.
#[inline]
pub fn uniform01(rng: &mut dyn RngCore) -> f64 {
    rng.random::<f64>()
}

/// `floor(u * n)`, clamped so that `u` rounding up to 1.0 cannot overflow.
#[inline]
pub fn uniform_index(rng: &mut dyn RngCore, n: usize) -> usize {
    ((uniform01(rng) * n as f64).floor() as usize).min(n.saturating_sub(1))
}

#[cfg(test)]
pub(crate) use scripted::ScriptedUniforms;

#[cfg(test)]
mod scripted {
    use rand::RngCore;
    use std::collections::VecDeque;

    /// Replays a fixed list of uniforms.
    ///
    /// rand builds an `f64` from the top 53 bits of `next_u64`, so each scripted `u`
    /// is encoded as `floor(u * 2^53) << 11`. Dyadic values such as 0.0, 0.25 or 0.5
    /// come back exactly.
    pub struct ScriptedUniforms {
        queue: VecDeque<f64>,
    }

    impl ScriptedUniforms {
        pub fn new(values: &[f64]) -> Self {
            Self { queue: values.iter().copied().collect() }
        }

        pub fn remaining(&self) -> usize { self.queue.len() }
    }

    impl RngCore for ScriptedUniforms {
        fn next_u32(&mut self) -> u32 {
            (self.next_u64() >> 32) as u32
        }

        fn next_u64(&mut self) -> u64 {
            let u = self.queue.pop_front().expect("scripted uniforms exhausted");
            ((u * (1u64 << 53) as f64) as u64) << 11
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            for chunk in dst.chunks_mut(8) {
                let bytes = self.next_u64().to_le_bytes();
                chunk.copy_from_slice(&bytes[..chunk.len()]);
            }
        }
    }

    #[test]
    fn test_scripted_values_round_trip() {
        let mut rng = ScriptedUniforms::new(&[0.0, 0.5, 0.25, 0.75]);
        assert_eq!(super::uniform01(&mut rng), 0.0);
        assert_eq!(super::uniform01(&mut rng), 0.5);
        assert_eq!(super::uniform_index(&mut rng, 4), 1);
        assert_eq!(super::uniform_index(&mut rng, 2), 1);
        assert_eq!(rng.remaining(), 0);
    }
}
