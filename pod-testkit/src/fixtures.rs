use pod::{RegionEndpoints, RunMode, RunRequest, RunnerConfig};

/// A local-mode runner targeting `url`.
pub fn runner(name: &str, url: &str) -> RunnerConfig {
    RunnerConfig::new(name).with_input("url", url)
}

/// A remote-mode runner targeting `url` in `region`.
pub fn regional_runner(name: &str, region: &str, url: &str) -> RunnerConfig {
    runner(name, url).with_region(region)
}

/// Local request from `(name, url)` pairs.
pub fn local_request(runners: &[(&str, &str)]) -> RunRequest {
    RunRequest::new(
        RunMode::Local,
        runners.iter().map(|(name, url)| runner(name, url)).collect(),
    )
}

/// Remote request from `(name, region, url)` triples.
pub fn remote_request(runners: &[(&str, &str, &str)]) -> RunRequest {
    RunRequest::new(
        RunMode::Remote,
        runners
            .iter()
            .map(|(name, region, url)| regional_runner(name, region, url))
            .collect(),
    )
}

/// Region map from `(region, endpoint)` pairs.
pub fn regions(entries: &[(&str, &str)]) -> RegionEndpoints {
    entries
        .iter()
        .fold(RegionEndpoints::new(), |map, (region, endpoint)| {
            map.with_region(*region, *endpoint)
        })
}
