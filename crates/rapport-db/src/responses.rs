use std::collections::{BTreeMap, HashSet};

use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

use rapport_types::api::AnswerInput;
use rapport_types::models::{Question, QuestionOption, QuizAnswer, UserId};

use crate::queries::OptionalExt;
use crate::{Database, DbError, Result};

impl Database {
    // -- Quiz catalogue --

    /// Insert a question with its options. Returns the question id and the
    /// option ids in the order given.
    pub fn create_question(&self, text: &str, options: &[&str]) -> Result<(i64, Vec<i64>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("INSERT INTO questions (text) VALUES (?1)", [text])?;
            let question_id = tx.last_insert_rowid();

            let mut option_ids = Vec::with_capacity(options.len());
            for option in options {
                tx.execute(
                    "INSERT INTO options (question_id, text) VALUES (?1, ?2)",
                    (question_id, option),
                )?;
                option_ids.push(tx.last_insert_rowid());
            }

            tx.commit()?;
            Ok((question_id, option_ids))
        })
    }

    pub fn list_questions(&self) -> Result<Vec<Question>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT q.id, q.text, o.id, o.text
                 FROM questions q
                 LEFT JOIN options o ON o.question_id = q.id
                 ORDER BY q.id, o.id",
            )?;

            let mut questions: BTreeMap<i64, Question> = BTreeMap::new();
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?;

            for row in rows {
                let (question_id, text, option_id, option_text) = row?;
                let question = questions.entry(question_id).or_insert_with(|| Question {
                    id: question_id,
                    text,
                    options: Vec::new(),
                });
                if let (Some(id), Some(text)) = (option_id, option_text) {
                    question.options.push(QuestionOption { id, text });
                }
            }

            Ok(questions.into_values().collect())
        })
    }

    // -- Answers --

    pub fn has_taken_quiz(&self, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM quiz_answers WHERE user_id = ?1",
                [user_id],
                |r| r.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn answers_for_user(&self, user_id: UserId) -> Result<Vec<QuizAnswer>> {
        self.with_conn(|conn| query_answers(conn, user_id))
    }

    /// Record a user's quiz answers atomically.
    ///
    /// Every answer must name an option that belongs to its question, a
    /// question may appear only once per submission, and a question the user
    /// already answered is refused rather than overwritten.
    pub fn submit_answers(&self, user_id: UserId, answers: &[AnswerInput]) -> Result<usize> {
        if answers.is_empty() {
            return Err(DbError::validation("no answers submitted"));
        }

        let mut seen = HashSet::with_capacity(answers.len());
        for answer in answers {
            if !seen.insert(answer.question_id) {
                return Err(DbError::validation(format!(
                    "question {} answered more than once",
                    answer.question_id
                )));
            }
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            for answer in answers {
                let owner: Option<i64> = tx
                    .query_row(
                        "SELECT question_id FROM options WHERE id = ?1",
                        [answer.option_id],
                        |r| r.get(0),
                    )
                    .optional()?;
                if owner != Some(answer.question_id) {
                    return Err(DbError::validation(format!(
                        "option {} does not belong to question {}",
                        answer.option_id, answer.question_id
                    )));
                }

                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT option_id FROM quiz_answers WHERE user_id = ?1 AND question_id = ?2",
                        (user_id, answer.question_id),
                        |r| r.get(0),
                    )
                    .optional()?;
                if existing.is_some() {
                    return Err(DbError::invalid_state(format!(
                        "question {} already answered",
                        answer.question_id
                    )));
                }

                tx.execute(
                    "INSERT INTO quiz_answers (user_id, question_id, option_id) VALUES (?1, ?2, ?3)",
                    (user_id, answer.question_id, answer.option_id),
                )?;
            }

            tx.commit()?;
            debug!("Stored {} answers for user {}", answers.len(), user_id);
            Ok(answers.len())
        })
    }
}

pub(crate) fn query_answers(conn: &Connection, user_id: UserId) -> Result<Vec<QuizAnswer>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, question_id, option_id FROM quiz_answers
         WHERE user_id = ?1 ORDER BY question_id",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok(QuizAnswer {
                user_id: row.get(0)?,
                question_id: row.get(1)?,
                option_id: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
