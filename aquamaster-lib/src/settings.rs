// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

use std::time::Duration;

/// Link and scheduling parameters for the bus master.
#[derive(Debug, Clone)]
pub struct BusSettings {
    pub baud_rate: u32,

    /// How often disconnected slaves are offered a probe.
    pub probe_period: Duration,
    /// Delay before the first probe cycle after startup.
    pub probe_initial_delay: Duration,

    /// How often connected-device polling runs.
    pub work_period: Duration,
    /// Delay before the first polling cycle after startup.
    pub work_initial_delay: Duration,
    /// Re-check interval when polling finds the bus busy.
    pub contention_delay: Duration,

    /// How long a transmitted request waits for its reply. Includes the
    /// time to clock the request frame out at 9600 baud.
    pub reply_timeout: Duration,

    /// Mandatory bus idle time between consecutive frames. 3.5 characters
    /// at 9600 baud is about 3.6 milliseconds; rounded up.
    pub interframe_gap: Duration,

    /// A slave that has not replied for this long is considered gone.
    pub liveness_timeout: Duration,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            probe_period: Duration::from_secs(2),
            probe_initial_delay: Duration::from_secs(1),
            work_period: Duration::from_millis(500),
            work_initial_delay: Duration::from_millis(1200),
            contention_delay: Duration::from_millis(100),
            reply_timeout: Duration::from_millis(200),
            interframe_gap: Duration::from_millis(4),
            liveness_timeout: Duration::from_secs(2),
        }
    }
}
