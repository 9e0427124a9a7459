// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Build- and scan-time tunables (§6 "Configuration knobs").

/// Version of the key-RLE run format a builder writes.
///
/// Readers understand both tags regardless of this setting; it only
/// controls what a [`crate::builder::Builder`] emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyRleVersion {
    /// Tag `0x8001`: runs are delimited purely by key-value changes.
    V1,
    /// Tag `0x8002`: each run carries an explicit `continues` byte, so a run
    /// boundary can also fall on a duplicate key (used when INCLUDE values
    /// differ within a run of equal keys).
    V2,
    /// Picks V2 for schemas whose comparator is integer-like (the fast
    /// sorted-build paths feed it keys in large duplicate-free or
    /// long-duplicate-run batches, where the continuation byte pays for
    /// itself across page boundaries) and V1 otherwise, i.e. for
    /// [`crate::comparator::CLocaleComparator`]-keyed text builds.
    #[default]
    Auto,
}

/// Tunables that influence how a [`crate::builder::Builder`] packs pages.
///
/// Mirrors the teacher's builder-pattern [`struct@crate::config::Config`]:
/// every field has a sensible default and is only overridden through a
/// chained setter.
#[derive(Debug, Clone)]
#[must_use]
pub struct Config {
    pub(crate) rle_uniqueness_threshold: f32,
    pub(crate) key_rle_version: KeyRleVersion,
    pub(crate) parallel_claim_batch: u32,
    pub(crate) prefetch_depth: u32,
    pub(crate) build_zone_maps: bool,
    pub(crate) debug_log: bool,
    pub(crate) profile: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rle_uniqueness_threshold: 0.5,
            key_rle_version: KeyRleVersion::default(),
            parallel_claim_batch: 1,
            prefetch_depth: 1,
            build_zone_maps: true,
            debug_log: false,
            profile: false,
        }
    }
}

impl Config {
    /// Creates a config with every default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fraction of distinct keys, among a leaf's candidate rows,
    /// above which the builder leaves the leaf in Plain form instead of
    /// RLE-encoding it.
    ///
    /// Default: `0.5`. A leaf whose keys are almost all distinct gains
    /// nothing from run-length encoding and paying the run-header overhead
    /// would only shrink the page's effective fanout.
    ///
    /// # Panics
    ///
    /// Panics if `threshold` is not in `0.0..=1.0`.
    pub fn rle_uniqueness_threshold(mut self, threshold: f32) -> Self {
        assert!(
            (0.0..=1.0).contains(&threshold),
            "rle_uniqueness_threshold must be in 0.0..=1.0"
        );
        self.rle_uniqueness_threshold = threshold;
        self
    }

    /// Sets which key-RLE tag the builder emits. Default: [`KeyRleVersion::Auto`].
    pub fn key_rle_version(mut self, version: KeyRleVersion) -> Self {
        self.key_rle_version = version;
        self
    }

    /// Sets how many leaves a parallel scan worker claims per CAS round-trip
    /// (§4.6). Default: `1`.
    ///
    /// # Panics
    ///
    /// Panics if `batch` is `0`.
    pub fn parallel_claim_batch(mut self, batch: u32) -> Self {
        assert!(batch > 0, "parallel_claim_batch must be at least 1");
        self.parallel_claim_batch = batch;
        self
    }

    /// Sets how many leaves ahead a scan's optional readahead hint reaches.
    /// Default: `1`. `0` disables prefetch.
    pub fn prefetch_depth(mut self, depth: u32) -> Self {
        self.prefetch_depth = depth;
        self
    }

    /// Enables or disables zone-map construction on internal pages (§5).
    /// Default: `true`.
    pub fn build_zone_maps(mut self, enabled: bool) -> Self {
        self.build_zone_maps = enabled;
        self
    }

    /// Enables verbose structural logging during a build, emitted through
    /// the `log` facade at `debug` level. Default: `false`.
    pub fn debug_log(mut self, enabled: bool) -> Self {
        self.debug_log = enabled;
        self
    }

    /// Enables collection of coarse build/scan timing, emitted through the
    /// `log` facade at `info` level on completion. Default: `false`.
    pub fn profile(mut self, enabled: bool) -> Self {
        self.profile = enabled;
        self
    }
}
