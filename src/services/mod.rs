pub(crate) mod ai_grading;
pub(crate) mod collaborators;
pub(crate) mod errors;
pub(crate) mod grader;
pub(crate) mod grading_request;
pub(crate) mod grading_result;
pub(crate) mod statistics;
pub(crate) mod visual_aid;
