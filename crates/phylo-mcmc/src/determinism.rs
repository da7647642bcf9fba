use phylo_core::derive_substream_seed;

/// Derives the seed for one chain's private move stream. Each chain gets
/// its own stream so its accept/reject sequence is independent of every
/// other chain's progress.
pub fn move_stream_seed(master_seed: u64, rank: usize) -> u64 {
    derive_substream_seed(master_seed, rank as u64)
}

/// Derives the seed for the swap stream. Every chain seeds its swap RNG
/// identically, so all chains replay the same peer-pair and decision draws
/// without communicating.
pub fn swap_stream_seed(swap_seed: u64) -> u64 {
    derive_substream_seed(swap_seed ^ 0xA5A5_A5A5_A5A5_A5A5, 0)
}
