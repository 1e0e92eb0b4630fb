//! Mismatch policy
//!
//! Decides whether a difference between the number of local files and the
//! number of parts the remote ordering expects stops the run.

/// Outcome of comparing local and remote cardinalities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Counts agree
    Proceed,
    /// Counts differ but mismatches are tolerated
    ProceedPartial {
        /// Entries that can be aligned: the smaller of both counts
        aligned: usize,
        /// Local files left untouched
        excess_local: usize,
        /// Remote parts without a local file
        excess_remote: usize,
    },
    /// Counts differ and mismatches are fatal
    Abort { local: usize, remote: usize },
}

/// Compares the local file count with the total remote part count
pub fn resolve(local_count: usize, remote_total_parts: usize, ignore_errors: bool) -> Decision {
    if local_count == remote_total_parts {
        return Decision::Proceed;
    }

    if !ignore_errors {
        return Decision::Abort {
            local: local_count,
            remote: remote_total_parts,
        };
    }

    Decision::ProceedPartial {
        aligned: local_count.min(remote_total_parts),
        excess_local: local_count.saturating_sub(remote_total_parts),
        excess_remote: remote_total_parts.saturating_sub(local_count),
    }
}
