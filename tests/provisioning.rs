mod common;

use alloy::primitives::{Address, U256};
use orgdeploy::environment::EnvironmentKind;
use orgdeploy::plan::{
    Action, ProvisioningPlan, ProvisioningStep, INITIAL_GOVERNANCE_SUPPLY, UNLOCK_AMOUNT,
};
use orgdeploy::{
    Artifact, DeployError, OperatorWallet, OrganizationState, ResourceName, ResourceOrigin,
};
use std::collections::HashSet;

use common::*;

const PRINCIPAL: [ResourceName; 7] = [
    ResourceName::StableToken,
    ResourceName::Exchange,
    ResourceName::ContentToken,
    ResourceName::Voting,
    ResourceName::GovernanceToken,
    ResourceName::BondingMath,
    ResourceName::Organization,
];

fn without_approval(plan: &ProvisioningPlan) -> ProvisioningPlan {
    ProvisioningPlan::from_steps(
        plan.steps()
            .iter()
            .filter(|step| {
                !matches!(
                    step,
                    ProvisioningStep::Invoke {
                        action: Action::Approve { .. },
                        ..
                    }
                )
            })
            .cloned()
            .collect(),
    )
}

#[tokio::test]
async fn ephemeral_run_unlocks_organization() {
    let wallet = OperatorWallet::random();
    let env = ephemeral(&wallet);
    let chain = chain_for(&env).await;
    let mut provisioner = provisioner(env.clone(), &chain);
    let plan = ProvisioningPlan::for_environment(&env);

    let report = provisioner.run(&plan).await.unwrap();

    assert_eq!(report.organization_state, Some(OrganizationState::Unlocked));
    assert_eq!(provisioner.organization_state(), Some(OrganizationState::Unlocked));
    assert_eq!(report.resources.len(), 9);
    for name in PRINCIPAL {
        assert!(report.address_of(name).is_some(), "{name} missing from report");
    }

    let stable = report.address_of(ResourceName::StableToken).unwrap();
    let governance = report.address_of(ResourceName::GovernanceToken).unwrap();
    let content = report.address_of(ResourceName::ContentToken).unwrap();
    let exchange = report.address_of(ResourceName::Exchange).unwrap();
    let organization = report.address_of(ResourceName::Organization).unwrap();

    // The organization holds exactly one unit of stable-value token
    assert_eq!(chain.balance_of(stable, organization).await, UNLOCK_AMOUNT);
    assert_eq!(chain.balance_of(stable, env.operator).await, U256::ZERO);
    assert_eq!(chain.allowance(stable, env.operator, organization).await, U256::ZERO);
    assert!(chain.is_unlocked(organization).await);

    // Initial governance supply went to the operator
    assert_eq!(
        chain.balance_of(governance, env.operator).await,
        INITIAL_GOVERNANCE_SUPPLY
    );
    assert_eq!(chain.total_supply(governance).await, INITIAL_GOVERNANCE_SUPPLY);
    assert_eq!(chain.total_supply(stable).await, UNLOCK_AMOUNT);

    // Role handoff: the organization is the only governance minter
    assert!(chain.is_minter(governance, organization).await);
    assert!(!chain.is_minter(governance, env.operator).await);
    assert_eq!(chain.minter_count(governance).await, 1);
    assert!(chain.is_minter(content, organization).await);
    assert!(chain.is_minter(stable, exchange).await);
}

#[tokio::test]
async fn ephemeral_run_submits_in_plan_order() {
    let wallet = OperatorWallet::random();
    let env = ephemeral(&wallet);
    let chain = chain_for(&env).await;
    let plan = ProvisioningPlan::for_environment(&env);

    provisioner(env, &chain).run(&plan).await.unwrap();

    let history = chain.history().await;
    assert_eq!(
        history,
        vec![
            "deploy stable_token",
            "stable_token.mint",
            "deploy exchange",
            "stable_token.addMinter",
            "deploy content_token",
            "deploy weighting_helper",
            "deploy voting",
            "deploy governance_token",
            "deploy bonding_helper",
            "deploy bonding_math",
            "deploy organization",
            "content_token.addMinter",
            "governance_token.addMinter",
            "governance_token.renounceMinter",
            "stable_token.approve",
            "organization.unlockOrganisation",
        ]
    );

    let position = |entry: &str| history.iter().position(|h| h == entry).unwrap();
    assert!(position("governance_token.addMinter") < position("governance_token.renounceMinter"));
    assert!(position("stable_token.approve") < position("organization.unlockOrganisation"));
}

#[tokio::test]
async fn activation_without_approval_fails_and_keeps_registry() {
    let wallet = OperatorWallet::random();
    let env = ephemeral(&wallet);
    let chain = chain_for(&env).await;
    let mut provisioner = provisioner(env.clone(), &chain);
    let plan = without_approval(&ProvisioningPlan::for_environment(&env));
    plan.validate().unwrap();

    let err = provisioner.run(&plan).await.unwrap_err();

    let activation = plan
        .position(|step| {
            matches!(
                step,
                ProvisioningStep::Invoke {
                    action: Action::Activate { .. },
                    ..
                }
            )
        })
        .unwrap();
    assert_eq!(err.failed_step(), Some(activation));

    match err.root() {
        DeployError::InvocationFailed { target, action, reason } => {
            assert_eq!(target, "organization");
            assert_eq!(action, "unlockOrganisation");
            assert!(reason.contains("insufficient allowance"), "reason: {reason}");
        }
        other => panic!("unexpected error: {other}"),
    }

    match &err {
        DeployError::PartialRunAbort { created, .. } => {
            let names: HashSet<ResourceName> = created.iter().map(|h| h.name).collect();
            for name in PRINCIPAL {
                assert!(names.contains(&name), "{name} missing after abort");
            }
            assert_eq!(created.len(), 9);
        }
        other => panic!("expected a partial-run abort, got {other}"),
    }
    assert_eq!(provisioner.registry().len(), 9);
    assert_eq!(
        provisioner.organization_state(),
        Some(OrganizationState::PermissionsGranted)
    );
}

#[tokio::test]
async fn second_activation_in_same_run_is_refused() {
    let wallet = OperatorWallet::random();
    let env = ephemeral(&wallet);
    let chain = chain_for(&env).await;
    let mut steps = ProvisioningPlan::for_environment(&env).steps().to_vec();
    let activation = steps.last().cloned().unwrap();
    steps.push(activation);
    let plan = ProvisioningPlan::from_steps(steps);

    let err = provisioner(env, &chain).run(&plan).await.unwrap_err();

    assert_eq!(err.failed_step(), Some(plan.len() - 1));
    assert!(matches!(err.root(), DeployError::AlreadyUnlocked { .. }));
    assert_eq!(
        chain
            .history()
            .await
            .iter()
            .filter(|h| h.ends_with("unlockOrganisation"))
            .count(),
        1
    );
}

#[tokio::test]
async fn activating_an_unlocked_organization_surfaces_already_unlocked() {
    let wallet = OperatorWallet::random();
    let env = ephemeral(&wallet);
    let chain = chain_for(&env).await;
    let report = provisioner(env.clone(), &chain)
        .run(&ProvisioningPlan::for_environment(&env))
        .await
        .unwrap();
    let organization = report.address_of(ResourceName::Organization).unwrap();

    // A later run that picks up the existing organization and activates it again
    let plan = ProvisioningPlan::from_steps(vec![
        ProvisioningStep::Reference {
            name: ResourceName::Organization,
            address: organization,
        },
        ProvisioningStep::invoke(
            ResourceName::Organization,
            Action::Activate {
                unlock_amount: UNLOCK_AMOUNT,
                initial_supply: INITIAL_GOVERNANCE_SUPPLY,
            },
        ),
    ]);
    let err = tokio_test::assert_err!(provisioner(env, &chain).run(&plan).await);

    match err.root() {
        DeployError::AlreadyUnlocked { organization: reported } => {
            assert_eq!(reported, &organization.to_string());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn persistent_run_references_configured_addresses() {
    let wallet = OperatorWallet::random();
    let env = resolve(EnvironmentKind::Persistent, persistent_config(), &wallet);
    let chain = chain_for(&env).await;
    let plan = ProvisioningPlan::for_environment(&env);

    let report = provisioner(env.clone(), &chain).run(&plan).await.unwrap();

    let shared_stable = address(SHARED_STABLE_TOKEN);
    assert_eq!(env.known.treasury, address(SHARED_TREASURY));
    assert_eq!(env.known.whitelister, address(SHARED_WHITELISTER));
    assert_eq!(report.address_of(ResourceName::StableToken), Some(shared_stable));

    let stable = &report.resources[0];
    assert_eq!(stable.origin, ResourceOrigin::Referenced);
    assert!(stable.tx_hash.is_none());
    assert!(report.steps[0].tx_hash.is_none());

    let history = chain.history().await;
    assert!(!history.iter().any(|h| h == "deploy stable_token"));
    assert!(!history.iter().any(|h| h == "stable_token.mint"));

    let organization = report.address_of(ResourceName::Organization).unwrap();
    assert_eq!(chain.balance_of(shared_stable, organization).await, UNLOCK_AMOUNT);
    assert_eq!(report.organization_state, Some(OrganizationState::Unlocked));
}

#[tokio::test]
async fn ephemeral_runs_share_no_addresses() {
    let first_wallet = OperatorWallet::random();
    let second_wallet = OperatorWallet::random();

    let mut seen: HashSet<Address> = HashSet::new();
    for wallet in [&first_wallet, &second_wallet] {
        let env = ephemeral(wallet);
        let chain = chain_for(&env).await;
        let report = provisioner(env.clone(), &chain)
            .run(&ProvisioningPlan::for_environment(&env))
            .await
            .unwrap();
        for handle in &report.resources {
            assert!(seen.insert(handle.address), "{} reused", handle.address);
        }
    }
    assert_eq!(seen.len(), 18);
}

#[tokio::test]
async fn rerun_on_same_network_creates_fresh_resources() {
    let wallet = OperatorWallet::random();
    let env = ephemeral(&wallet);
    let chain = chain_for(&env).await;
    let plan = ProvisioningPlan::for_environment(&env);

    let first = provisioner(env.clone(), &chain).run(&plan).await.unwrap();
    let second = provisioner(env, &chain).run(&plan).await.unwrap();

    let first: HashSet<Address> = first.resources.iter().map(|h| h.address).collect();
    assert!(second.resources.iter().all(|h| !first.contains(&h.address)));
}

#[tokio::test]
async fn swapped_renounce_and_grant_is_rejected_before_submission() {
    let wallet = OperatorWallet::random();
    let env = ephemeral(&wallet);
    let chain = chain_for(&env).await;
    let mut steps = ProvisioningPlan::for_environment(&env).steps().to_vec();

    let grant = steps
        .iter()
        .position(|s| {
            matches!(
                s,
                ProvisioningStep::Invoke {
                    target: ResourceName::GovernanceToken,
                    action: Action::GrantMinter { .. }
                }
            )
        })
        .unwrap();
    let renounce = steps
        .iter()
        .position(|s| {
            matches!(
                s,
                ProvisioningStep::Invoke {
                    action: Action::RenounceMinter,
                    ..
                }
            )
        })
        .unwrap();
    steps.swap(grant, renounce);
    let plan = ProvisioningPlan::from_steps(steps);

    let err = tokio_test::assert_err!(provisioner(env, &chain).run(&plan).await);

    match err {
        DeployError::Plan(orgdeploy::PlanError::RenounceBeforeGrant { step, target }) => {
            assert_eq!(step, grant);
            assert_eq!(target, "governance_token");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(chain.history().await.is_empty());
}

#[tokio::test]
async fn mistyped_constructor_is_rejected_before_submission() {
    let wallet = OperatorWallet::random();
    let env = ephemeral(&wallet);
    let chain = chain_for(&env).await;

    let mut artifacts = artifacts();
    artifacts.insert(
        ResourceName::Exchange,
        Artifact::from_json(
            "DAIExchange",
            r#"{
                "abi": [{
                    "type": "constructor",
                    "inputs": [
                        { "name": "daiToken", "type": "address" },
                        { "name": "rate", "type": "uint256" }
                    ],
                    "stateMutability": "nonpayable"
                }],
                "bytecode": "0x6080604052"
            }"#,
        )
        .unwrap(),
    );
    let mut provisioner =
        orgdeploy::Provisioner::new(env.clone(), artifacts, chain.clone(), chain.clone());

    let err = provisioner
        .run(&ProvisioningPlan::for_environment(&env))
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some(2));
    match err.root() {
        DeployError::InvalidConstructorArgs { artifact, .. } => assert_eq!(artifact, "DAIExchange"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!chain.history().await.iter().any(|h| h == "deploy exchange"));
    assert!(!provisioner.registry().contains(ResourceName::Exchange));
}

#[tokio::test]
async fn rejected_deployment_stops_the_run() {
    let wallet = OperatorWallet::random();
    let env = ephemeral(&wallet);
    let chain = chain_for(&env).await;
    chain.fail_deployment(ResourceName::Voting, "out of gas").await;

    let err = provisioner(env.clone(), &chain)
        .run(&ProvisioningPlan::for_environment(&env))
        .await
        .unwrap_err();

    match err.root() {
        DeployError::DeploymentFailed { artifact, reason } => {
            assert_eq!(artifact, "Voting");
            assert_eq!(reason, "out of gas");
        }
        other => panic!("unexpected error: {other}"),
    }
    let history = chain.history().await;
    assert_eq!(history.last().map(String::as_str), Some("deploy weighting_helper"));
}
