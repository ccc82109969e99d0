//! Reloj del servidor (epoch en segundos).
//!
//! Todos los cortes temporales (orphan, retención, clave de historia) se
//! calculan contra un `Clock` inyectado para poder fijar el tiempo en tests.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::errors::StoreError;

pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 { Utc::now().timestamp() }
}

/// Reloj manual para pruebas y simulaciones.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now: i64) -> Self { Self(AtomicI64::new(now)) }
    pub fn set(&self, now: i64) { self.0.store(now, Ordering::SeqCst) }
    pub fn advance(&self, secs: i64) { self.0.fetch_add(secs, Ordering::SeqCst); }
}

impl Clock for FixedClock {
    fn now(&self) -> i64 { self.0.load(Ordering::SeqCst) }
}

/// Corte `now - amount * unit_secs` para las ventanas de retención.
///
/// Una ventana negativa pondría el corte en el futuro y barrería todo, así que
/// se rechaza; ventanas enormes saturan en vez de desbordar.
pub fn cutoff_before(now: i64, amount: i64, unit_secs: i64) -> Result<i64, StoreError> {
    if amount < 0 {
        return Err(StoreError::InvalidArgument(format!("ventana negativa: {amount}")));
    }
    Ok(now.saturating_sub(amount.saturating_mul(unit_secs)))
}
