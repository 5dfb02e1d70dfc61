//! Fan-out of a [`RunRequest`] into [`Job`]s.
//!
//! Runners are grouped so that one job shares a single execution context:
//! by URL in local mode, by `(url, region)` in remote mode. Groups keep the
//! order in which their first runner appears in the request.

use std::collections::HashMap;

use crate::error::{PodError, Result};
use crate::job::{Job, JobId};
use crate::run::{RunId, RunMode, RunRequest, RunnerConfig};

/// Plan the jobs for `request`.
///
/// `default_timeout` applies to jobs when the request carries no timeout.
///
/// # Errors
///
/// Returns a configuration error naming the first runner that lacks the
/// URL (local) or URL and region (remote) its mode requires.
pub fn plan(
    request: &RunRequest,
    run_id: &RunId,
    default_timeout: Option<u64>,
) -> Result<Vec<Job>> {
    let timeout = request.timeout.or(default_timeout);
    let span = crate::telemetry::plan_span(run_id.as_str(), request.mode.as_str());
    let _enter = span.enter();

    let groups = match request.mode {
        RunMode::Local => group_local(&request.runners)?,
        RunMode::Remote => group_remote(&request.runners)?,
    };

    let jobs: Vec<Job> = groups
        .into_iter()
        .map(|group| Job {
            job_id: JobId::new(),
            region: group.region,
            runners: group.runners,
            run_id: run_id.clone(),
            timeout,
        })
        .collect();

    tracing::debug!(
        runners = request.runners.len(),
        jobs = jobs.len(),
        "fan-out planned"
    );
    Ok(jobs)
}

struct Group {
    region: Option<String>,
    runners: Vec<RunnerConfig>,
}

fn group_local(runners: &[RunnerConfig]) -> Result<Vec<Group>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for runner in runners {
        let url = runner.url().ok_or_else(|| {
            PodError::configuration(format!(
                "runner {} is missing input.url required for local mode",
                runner.name
            ))
        })?;

        let slot = *index.entry(url).or_insert_with(|| {
            groups.push(Group {
                region: None,
                runners: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].runners.push(runner.clone());
    }

    Ok(groups)
}

fn group_remote(runners: &[RunnerConfig]) -> Result<Vec<Group>> {
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for runner in runners {
        let (Some(url), Some(region)) = (runner.url(), runner.region()) else {
            return Err(PodError::configuration(format!(
                "runner {} requires both region and input.url in remote mode",
                runner.name
            )));
        };

        let slot = *index.entry((url, region)).or_insert_with(|| {
            groups.push(Group {
                region: Some(region.to_string()),
                runners: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].runners.push(runner.clone());
    }

    if groups.is_empty() {
        return Err(PodError::configuration(
            "at least one runner with URL and region is required",
        ));
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn local(name: &str, url: &str) -> RunnerConfig {
        RunnerConfig::new(name).with_input("url", url)
    }

    fn remote(name: &str, region: &str, url: &str) -> RunnerConfig {
        RunnerConfig::new(name)
            .with_region(region)
            .with_input("url", url)
    }

    fn names(job: &Job) -> Vec<&str> {
        job.runner_names()
    }

    #[test]
    fn test_local_same_url_becomes_one_job() {
        let request = RunRequest::new(
            RunMode::Local,
            vec![local("a", "https://x"), local("b", "https://x")],
        );
        let jobs = plan(&request, &RunId::from("r"), None).unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(names(&jobs[0]), vec!["a", "b"]);
        assert!(jobs[0].region.is_none());
        assert_eq!(jobs[0].run_id, RunId::from("r"));
    }

    #[test]
    fn test_local_groups_by_url_only() {
        let request = RunRequest::new(
            RunMode::Local,
            vec![
                local("a", "https://x").with_input("depth", 1),
                local("b", "https://y"),
                local("c", "https://x").with_input("depth", 9),
                local("d", "https://y").with_region("eu"),
            ],
        );
        let jobs = plan(&request, &RunId::from("r"), None).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(names(&jobs[0]), vec!["a", "c"]);
        assert_eq!(names(&jobs[1]), vec!["b", "d"]);
        assert!(jobs.iter().all(|job| job.region.is_none()));
    }

    #[test]
    fn test_local_partition_covers_every_runner_once() {
        let runners: Vec<RunnerConfig> = (0..20)
            .map(|i| local(&format!("r{i}"), &format!("https://site/{}", i % 7)))
            .collect();
        let request = RunRequest::new(RunMode::Local, runners);
        let jobs = plan(&request, &RunId::from("r"), None).unwrap();

        let mut seen = Vec::new();
        for job in &jobs {
            let urls: HashSet<_> = job.runners.iter().filter_map(|r| r.url()).collect();
            assert_eq!(urls.len(), 1, "job mixes URLs: {urls:?}");
            seen.extend(job.runners.iter().map(|r| r.name.clone()));
        }
        seen.sort();
        let mut expected: Vec<String> = request.runners.iter().map(|r| r.name.clone()).collect();
        expected.sort();
        assert_eq!(seen, expected);
        assert_eq!(jobs.len(), 7);
    }

    #[test]
    fn test_local_missing_url_names_runner() {
        let request = RunRequest::new(
            RunMode::Local,
            vec![local("a", "https://x"), RunnerConfig::new("broken")],
        );
        let err = plan(&request, &RunId::from("r"), None).unwrap_err();
        assert!(matches!(err, PodError::Configuration { .. }));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_remote_splits_by_region() {
        let request = RunRequest::new(
            RunMode::Remote,
            vec![remote("a", "eu", "https://x"), remote("b", "us", "https://x")],
        );
        let jobs = plan(&request, &RunId::from("r"), None).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].region.as_deref(), Some("eu"));
        assert_eq!(names(&jobs[0]), vec!["a"]);
        assert_eq!(jobs[1].region.as_deref(), Some("us"));
        assert_eq!(names(&jobs[1]), vec!["b"]);
    }

    #[test]
    fn test_remote_groups_by_url_and_region_pair() {
        let request = RunRequest::new(
            RunMode::Remote,
            vec![
                remote("a", "eu", "https://x"),
                remote("b", "eu", "https://y"),
                remote("c", "eu", "https://x"),
                remote("d", "us", "https://x"),
            ],
        );
        let jobs = plan(&request, &RunId::from("r"), None).unwrap();

        assert_eq!(jobs.len(), 3);
        for job in &jobs {
            let region = job.region.as_deref().expect("remote job has region");
            let pairs: HashSet<_> = job
                .runners
                .iter()
                .map(|r| (r.url().unwrap(), r.region().unwrap()))
                .collect();
            assert_eq!(pairs.len(), 1);
            assert!(pairs.iter().all(|(_, r)| *r == region));
        }
        assert_eq!(names(&jobs[0]), vec!["a", "c"]);
    }

    #[test]
    fn test_remote_requires_region_and_url() {
        let request = RunRequest::new(
            RunMode::Remote,
            vec![RunnerConfig::new("no-region").with_input("url", "https://x")],
        );
        let err = plan(&request, &RunId::from("r"), None).unwrap_err();
        assert!(err.to_string().contains("no-region"));

        let request = RunRequest::new(
            RunMode::Remote,
            vec![RunnerConfig::new("no-url").with_region("eu")],
        );
        let err = plan(&request, &RunId::from("r"), None).unwrap_err();
        assert!(err.to_string().contains("no-url"));
    }

    #[test]
    fn test_remote_without_runners_fails() {
        let request = RunRequest::new(RunMode::Remote, Vec::new());
        let err = plan(&request, &RunId::from("r"), None).unwrap_err();
        assert!(err
            .to_string()
            .contains("at least one runner with URL and region is required"));
    }

    #[test]
    fn test_effective_timeout_prefers_request() {
        let runners = vec![local("a", "https://x")];
        let request = RunRequest::new(RunMode::Local, runners.clone()).with_timeout(900);
        let jobs = plan(&request, &RunId::from("r"), Some(5_000)).unwrap();
        assert_eq!(jobs[0].timeout, Some(900));

        let request = RunRequest::new(RunMode::Local, runners);
        let jobs = plan(&request, &RunId::from("r"), Some(5_000)).unwrap();
        assert_eq!(jobs[0].timeout, Some(5_000));
    }

    #[test]
    fn test_job_ids_are_unique() {
        let runners: Vec<RunnerConfig> = (0..50)
            .map(|i| local(&format!("r{i}"), &format!("https://site/{i}")))
            .collect();
        let request = RunRequest::new(RunMode::Local, runners);
        let jobs = plan(&request, &RunId::from("r"), None).unwrap();
        let ids: HashSet<_> = jobs.iter().map(|job| job.job_id).collect();
        assert_eq!(ids.len(), 50);
    }
}
