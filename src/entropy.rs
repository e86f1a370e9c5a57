//! Entropy providers: CSP wraps the OS CSPRNG, RDP wraps the CPU hardware
//! RNG, and ACP aggregates both with system state through cSHAKE-512.
//!
//! ACP is the library's random source of last resort: even if the
//! hardware RNG is absent or failing, the OS provider and system-state
//! mixing still feed the XOF. None of the providers keep state across
//! calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

use crate::cpu::{self, CpuFeatures};
use crate::sha3::CShake512;
use crate::Error;

/// The maximum bytes a provider returns per call.
pub const PROVIDER_MAX: usize = 10_240_000;

const SEED_DRAW: usize = 256;

/// Fills `out` from the OS cryptographic provider.
pub fn csp_fill(out: &mut [u8]) -> Result<(), Error> {
    if out.len() > PROVIDER_MAX {
        return Err(Error::LengthOverflow);
    }
    OsRng.try_fill_bytes(out).map_err(|_| Error::EntropyFailure)
}

/// Returns true when the CPU exposes a usable hardware RNG.
pub fn rdp_available() -> bool {
    cpu::features().has(CpuFeatures::RDRAND)
}

/// Fills `out` from the CPU hardware RNG, or reports
/// [`Error::EntropyFailure`] when it is absent or exhausted. Callers that
/// need a best-effort source should fall back to [`csp_fill`] or use
/// [`acp_fill`], which compensates automatically.
pub fn rdp_fill(out: &mut [u8]) -> Result<(), Error> {
    if out.len() > PROVIDER_MAX {
        return Err(Error::LengthOverflow);
    }
    #[cfg(target_arch = "x86_64")]
    if rdp_available() {
        for chunk in out.chunks_mut(8) {
            // Safety: gated on the rdrand capability bit.
            match unsafe { rdrand64() } {
                Some(v) => chunk.copy_from_slice(&v.to_le_bytes()[..chunk.len()]),
                None => return Err(Error::EntropyFailure),
            }
        }
        return Ok(());
    }
    Err(Error::EntropyFailure)
}

// The DRNG can run dry transiently; the standard guidance is a short
// retry loop.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "rdrand")]
unsafe fn rdrand64() -> Option<u64> {
    let mut value = 0u64;
    for _ in 0..16 {
        if core::arch::x86_64::_rdrand64_step(&mut value) == 1 {
            return Some(value);
        }
    }
    None
}

/// Fills `out` from the auto entropy collection provider: a timestamp, a
/// process-wide monotonic counter, host and process identity, system
/// statistics, the capability bitfield, and seed draws from CSP and (when
/// available) RDP, all absorbed into cSHAKE-512 under the "ACP" name.
pub fn acp_fill(out: &mut [u8]) -> Result<(), Error> {
    if out.len() > PROVIDER_MAX {
        return Err(Error::LengthOverflow);
    }

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let mut xof = CShake512::new(b"ACP", b"");

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    xof.absorb(&nanos.to_le_bytes());
    xof.absorb(&COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());

    xof.absorb(&hostname());
    xof.absorb(&std::process::id().to_le_bytes());
    let stats = SystemStats::read();
    xof.absorb(&stats.user_id.to_le_bytes());
    xof.absorb(&stats.uptime.to_le_bytes());
    xof.absorb(&stats.page_size.to_le_bytes());
    xof.absorb(&cpu::features().bits().to_le_bytes());
    xof.absorb(&stats.free_memory.to_le_bytes());

    let mut seed = Zeroizing::new([0u8; SEED_DRAW]);
    csp_fill(seed.as_mut())?;
    xof.absorb(seed.as_ref());
    if rdp_fill(seed.as_mut()).is_ok() {
        xof.absorb(seed.as_ref());
    }

    xof.squeeze(out);
    Ok(())
}

/// Draws a `u16` from ACP.
pub fn acp_u16() -> Result<u16, Error> {
    let mut b = [0u8; 2];
    acp_fill(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

/// Draws a `u32` from ACP.
pub fn acp_u32() -> Result<u32, Error> {
    let mut b = [0u8; 4];
    acp_fill(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

/// Draws a `u64` from ACP.
pub fn acp_u64() -> Result<u64, Error> {
    let mut b = [0u8; 8];
    acp_fill(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

struct SystemStats {
    user_id: u64,
    uptime: u64,
    page_size: u64,
    free_memory: u64,
}

impl SystemStats {
    #[cfg(target_os = "linux")]
    fn read() -> SystemStats {
        // Safety: sysinfo writes the struct or fails; a zeroed struct is a
        // valid fallback either way.
        let mut info: libc::sysinfo = unsafe { core::mem::zeroed() };
        let ok = unsafe { libc::sysinfo(&mut info) } == 0;
        SystemStats {
            user_id: unsafe { libc::getuid() } as u64,
            uptime: if ok { info.uptime as u64 } else { 0 },
            page_size: unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u64,
            free_memory: if ok { info.freeram as u64 * info.mem_unit as u64 } else { 0 },
        }
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn read() -> SystemStats {
        SystemStats {
            user_id: unsafe { libc::getuid() } as u64,
            uptime: 0,
            page_size: unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u64,
            free_memory: 0,
        }
    }

    #[cfg(not(unix))]
    fn read() -> SystemStats {
        SystemStats { user_id: 0, uptime: 0, page_size: 0, free_memory: 0 }
    }
}

#[cfg(unix)]
fn hostname() -> [u8; 64] {
    let mut name = [0u8; 64];
    // Safety: the buffer length is passed alongside the pointer.
    unsafe { libc::gethostname(name.as_mut_ptr() as *mut libc::c_char, name.len()) };
    name
}

#[cfg(not(unix))]
fn hostname() -> [u8; 64] {
    [0u8; 64]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csp_produces_distinct_draws() {
        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        csp_fill(&mut a).unwrap();
        csp_fill(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn providers_cap_request_size() {
        let mut big = vec![0u8; PROVIDER_MAX + 1];
        assert_eq!(csp_fill(&mut big), Err(Error::LengthOverflow));
        assert_eq!(rdp_fill(&mut big), Err(Error::LengthOverflow));
        assert_eq!(acp_fill(&mut big), Err(Error::LengthOverflow));
    }

    #[test]
    fn rdp_matches_capability() {
        let mut out = [0u8; 32];
        match rdp_fill(&mut out) {
            Ok(()) => assert!(rdp_available()),
            Err(Error::EntropyFailure) => {}
            Err(e) => panic!("unexpected error {e:?}"),
        }
    }

    // Not a determinism assertion: ACP reads the wall clock. Successive
    // draws must differ broadly, a statistical smoke check.
    #[test]
    fn acp_draws_are_statistically_distinct() {
        let mut a = [0u8; 256];
        let mut b = [0u8; 256];
        acp_fill(&mut a).unwrap();
        acp_fill(&mut b).unwrap();
        let differing = a.iter().zip(&b).filter(|(x, y)| x != y).count();
        assert!(differing > 200, "only {differing} of 256 positions differ");
    }

    #[test]
    fn acp_integer_draws() {
        let a = acp_u64().unwrap();
        let b = acp_u64().unwrap();
        assert_ne!(a, b);
        let _ = acp_u16().unwrap();
        let _ = acp_u32().unwrap();
    }
}
