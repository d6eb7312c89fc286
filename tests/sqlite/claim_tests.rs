//! Claim exclusivity, ordering, and eligibility.

use crate::sqlite::helpers::{TestContext, context};
use chrono::TimeDelta;
use conveyor::job::domain::{IssueRef, JobId, JobState};
use conveyor::job::services::{CreateJobRequest, RegisterIssueRequest};
use rstest::rstest;
use std::collections::HashSet;

fn request(issue_number: u64) -> CreateJobRequest {
    CreateJobRequest::new("github", "acme/widgets", issue_number, "widgets")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_claims_hand_each_job_to_one_worker(context: TestContext) {
    let service = context.service();
    let mut created = HashSet::new();
    for number in 1..=12 {
        let job = service.create_job(request(number)).await.expect("job");
        created.insert(job.id());
    }

    let mut workers = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let worker = service.clone();
        workers.spawn(async move {
            let mut claimed: Vec<JobId> = Vec::new();
            while let Some(job) = worker.claim_job().await.expect("claim") {
                claimed.push(job.id());
            }
            claimed
        });
    }

    let mut claimed = Vec::new();
    while let Some(joined) = workers.join_next().await {
        claimed.extend(joined.expect("worker task"));
    }
    let unique: HashSet<JobId> = claimed.iter().copied().collect();

    assert_eq!(claimed.len(), created.len(), "a job was claimed twice");
    assert_eq!(unique, created);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn claims_follow_creation_order(context: TestContext) {
    let service = context.service();
    let mut expected = Vec::new();
    for number in [30, 10, 20] {
        expected.push(service.create_job(request(number)).await.expect("job").id());
        context.clock.advance(TimeDelta::seconds(1));
    }

    let mut order = Vec::new();
    while let Some(job) = service.claim_job().await.expect("claim") {
        assert_eq!(job.state(), JobState::Planning);
        order.push(job.id());
    }

    assert_eq!(order, expected);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ineligible_issues_are_passed_over(context: TestContext) {
    let service = context.service();
    service
        .register_issue(
            RegisterIssueRequest::new("github", "acme/widgets", 40, "widgets")
                .with_title("Excluded by label")
                .with_eligible(false),
        )
        .await
        .expect("register");
    let held = service.create_job(request(40)).await.expect("job");

    assert!(service.claim_job().await.expect("claim").is_none());

    let issue_ref = IssueRef::from_parts("github", "acme/widgets", 40).expect("issue");
    assert!(
        service
            .set_issue_eligibility(&issue_ref, true)
            .await
            .expect("eligibility")
    );
    let claimed = service.claim_job().await.expect("claim").expect("job");
    assert_eq!(claimed.id(), held.id());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn claimed_job_is_active_for_its_issue(context: TestContext) {
    let service = context.service();
    let job = service.create_job(request(50)).await.expect("job");
    service.claim_job().await.expect("claim");

    let active = service
        .find_active_job_for_issue(job.issue_ref())
        .await
        .expect("lookup")
        .expect("active job");

    assert_eq!(active.id(), job.id());
    assert_eq!(active.state(), JobState::Planning);
    assert!(service.create_job(request(50)).await.is_err());
}
