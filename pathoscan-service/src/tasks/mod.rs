pub mod blood_test_analysis;
pub mod health_issues;
pub mod lifestyle_advice;
pub mod text_extract;

pub use blood_test_analysis::BloodTestAnalysisTask;
pub use health_issues::HealthIssueTask;
pub use lifestyle_advice::LifestyleAdviceTask;
pub use text_extract::{NO_TEXT_FOUND, TextExtractTask};
