pub mod attempt;
pub mod grade;
pub mod question;
pub mod student_answer;
pub mod test;
