// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Callbacks supplied by the host application.
//!
//! The supervisor never looks into jobs. It only asks "is there work?" and
//! "process one unit", and interprets `true` as "keep going".

pub trait Listener {
    /// Returns true while the job source has pending work.
    fn has_work(&mut self) -> bool;
}

pub trait Worker {
    /// Processes one unit. Returns false once there is nothing left to do.
    fn process_unit(&mut self) -> bool;
}

impl<F> Listener for F
where
    F: FnMut() -> bool,
{
    fn has_work(&mut self) -> bool {
        self()
    }
}

impl<F> Worker for F
where
    F: FnMut() -> bool,
{
    fn process_unit(&mut self) -> bool {
        self()
    }
}
