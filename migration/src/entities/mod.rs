pub mod academic_period;
pub mod active_session;
pub mod course;
pub mod course_special_criterion;
pub mod course_sub_criterion;
pub mod course_task;
pub mod criterion_score;
pub mod enrollment;
pub mod evaluation_criterion;
pub mod evaluation_template;
pub mod family_relationship;
pub mod program;
pub mod project;
pub mod project_member;
pub mod registration_request;
pub mod special_criterion_score;
pub mod subject;
pub mod task_score;
pub mod user;

pub use academic_period::Entity as AcademicPeriodEntity;
pub use active_session::Entity as ActiveSessionEntity;
pub use course::Entity as CourseEntity;
pub use course_special_criterion::Entity as CourseSpecialCriterionEntity;
pub use course_sub_criterion::Entity as CourseSubCriterionEntity;
pub use course_task::Entity as CourseTaskEntity;
pub use criterion_score::Entity as CriterionScoreEntity;
pub use enrollment::Entity as EnrollmentEntity;
pub use evaluation_criterion::Entity as EvaluationCriterionEntity;
pub use evaluation_template::Entity as EvaluationTemplateEntity;
pub use family_relationship::Entity as FamilyRelationshipEntity;
pub use program::Entity as ProgramEntity;
pub use project::Entity as ProjectEntity;
pub use project_member::Entity as ProjectMemberEntity;
pub use registration_request::Entity as RegistrationRequestEntity;
pub use special_criterion_score::Entity as SpecialCriterionScoreEntity;
pub use subject::Entity as SubjectEntity;
pub use task_score::Entity as TaskScoreEntity;
pub use user::Entity as UserEntity;
