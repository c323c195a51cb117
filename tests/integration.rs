#[path = "integration/planner_test.rs"]
mod planner_test;
