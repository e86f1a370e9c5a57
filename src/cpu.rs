//! Platform capability detection.
//!
//! The capability bitfield is read once per process and then passed by value
//! into the primitives that dispatch on it: the AES engine (hardware round
//! instructions), the RDP entropy provider (rdrand), and the parallel
//! Keccak/ChaCha states (lane width selection).

use std::sync::OnceLock;

/// A bitfield of the CPU features the library dispatches on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuFeatures(u32);

impl CpuFeatures {
    /// AES round instructions (AES-NI / ARMv8 AES).
    pub const AES: CpuFeatures = CpuFeatures(1);
    /// Carry-less multiplication (pclmulqdq / pmull).
    pub const PCLMUL: CpuFeatures = CpuFeatures(1 << 1);
    /// 256-bit vector registers.
    pub const AVX: CpuFeatures = CpuFeatures(1 << 2);
    /// 256-bit integer vector operations.
    pub const AVX2: CpuFeatures = CpuFeatures(1 << 3);
    /// 512-bit vector registers.
    pub const AVX512: CpuFeatures = CpuFeatures(1 << 4);
    /// ARM NEON.
    pub const NEON: CpuFeatures = CpuFeatures(1 << 5);
    /// SHA extensions.
    pub const SHA: CpuFeatures = CpuFeatures(1 << 6);
    /// Hardware random number generator (rdrand).
    pub const RDRAND: CpuFeatures = CpuFeatures(1 << 7);

    /// Returns true if all the features in `other` are present.
    #[inline]
    pub fn has(self, other: CpuFeatures) -> bool {
        self.0 & other.0 == other.0
    }

    /// The raw bitfield value.
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// The widest SIMD lane count usable for parallel permutation states.
    #[inline]
    pub fn lane_width(self) -> usize {
        if self.has(CpuFeatures::AVX512) {
            8
        } else if self.has(CpuFeatures::AVX2) || self.has(CpuFeatures::NEON) {
            4
        } else {
            1
        }
    }

    fn union(self, other: CpuFeatures) -> CpuFeatures {
        CpuFeatures(self.0 | other.0)
    }
}

/// Returns the process-wide capability bitfield, detecting it on first use.
pub fn features() -> CpuFeatures {
    static FEATURES: OnceLock<CpuFeatures> = OnceLock::new();
    *FEATURES.get_or_init(detect)
}

#[cfg(target_arch = "x86_64")]
fn detect() -> CpuFeatures {
    let mut f = CpuFeatures::default();
    if std::arch::is_x86_feature_detected!("aes") {
        f = f.union(CpuFeatures::AES);
    }
    if std::arch::is_x86_feature_detected!("pclmulqdq") {
        f = f.union(CpuFeatures::PCLMUL);
    }
    if std::arch::is_x86_feature_detected!("avx") {
        f = f.union(CpuFeatures::AVX);
    }
    if std::arch::is_x86_feature_detected!("avx2") {
        f = f.union(CpuFeatures::AVX2);
    }
    if std::arch::is_x86_feature_detected!("avx512f") {
        f = f.union(CpuFeatures::AVX512);
    }
    if std::arch::is_x86_feature_detected!("sha") {
        f = f.union(CpuFeatures::SHA);
    }
    if std::arch::is_x86_feature_detected!("rdrand") {
        f = f.union(CpuFeatures::RDRAND);
    }
    f
}

#[cfg(target_arch = "aarch64")]
fn detect() -> CpuFeatures {
    let mut f = CpuFeatures::NEON;
    if std::arch::is_aarch64_feature_detected!("aes") {
        f = f.union(CpuFeatures::AES);
    }
    if std::arch::is_aarch64_feature_detected!("pmull") {
        f = f.union(CpuFeatures::PCLMUL);
    }
    if std::arch::is_aarch64_feature_detected!("sha2") {
        f = f.union(CpuFeatures::SHA);
    }
    f
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn detect() -> CpuFeatures {
    CpuFeatures::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_is_stable() {
        assert_eq!(features(), features());
    }

    #[test]
    fn lane_width_is_sane() {
        let w = features().lane_width();
        assert!(w == 1 || w == 4 || w == 8);
    }
}
