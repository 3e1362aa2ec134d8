pub mod answer_checker;
pub mod attempt_service;
pub mod cloner;
pub mod eligibility;
pub mod manual_grading;
pub mod score_aggregator;
pub mod test_service;
