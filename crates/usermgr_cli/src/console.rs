//! Menu-driven console loop.
//!
//! # Responsibility
//! - Read menu choices and field values line by line.
//! - Turn raw text into typed values before calling the user service.
//! - Present results and categorized errors.
//!
//! # Invariants
//! - Parse failures never reach the service; they print a message and return
//!   to the menu.
//! - `update` is only called after an explicit `y` confirmation.
//! - End of input exits the loop cleanly.

use std::io::{self, BufRead, Write};
use usermgr_core::{RepoError, User, UserId, UserPatch, UserRepository, UserService};

const MENU: &str = "
1. Create user
2. Find user by ID
3. Update user
4. Delete user
5. List all users
0. Exit
Choice: ";

enum Flow {
    Continue,
    Exit,
}

/// Interactive front-end over a `UserService`.
pub struct Console<'svc, R, W, Repo: UserRepository> {
    input: R,
    output: W,
    service: &'svc UserService<Repo>,
}

impl<'svc, R: BufRead, W: Write, Repo: UserRepository> Console<'svc, R, W, Repo> {
    pub fn new(input: R, output: W, service: &'svc UserService<Repo>) -> Self {
        Self {
            input,
            output,
            service,
        }
    }

    /// Runs the menu loop until `0` or end of input and hands the writer back.
    pub fn run(mut self) -> io::Result<W> {
        loop {
            write!(self.output, "{MENU}")?;
            self.output.flush()?;

            let Some(choice) = self.read_line()? else {
                break;
            };
            let flow = match choice.trim() {
                "1" => self.create_user()?,
                "2" => self.find_user()?,
                "3" => self.update_user()?,
                "4" => self.delete_user()?,
                "5" => self.list_users()?,
                "0" => Flow::Exit,
                other => {
                    writeln!(self.output, "Unknown choice `{other}`")?;
                    Flow::Continue
                }
            };
            if let Flow::Exit = flow {
                break;
            }
        }
        writeln!(self.output, "Bye")?;
        self.output.flush()?;
        Ok(self.output)
    }

    fn create_user(&mut self) -> io::Result<Flow> {
        writeln!(self.output, "\n--- Create user ---")?;
        let Some(name) = self.prompt("Name: ")? else {
            return Ok(Flow::Exit);
        };
        let Some(email) = self.prompt("Email: ")? else {
            return Ok(Flow::Exit);
        };
        let Some(age_text) = self.prompt("Age: ")? else {
            return Ok(Flow::Exit);
        };
        let Ok(age) = age_text.trim().parse::<i32>() else {
            writeln!(self.output, "Error: age must be a number")?;
            return Ok(Flow::Continue);
        };

        match self.service.create_user(name, email.trim(), age) {
            Ok(user) => writeln!(
                self.output,
                "User created. ID: {}",
                display_id(user.id)
            )?,
            Err(err) => self.report(&err)?,
        }
        Ok(Flow::Continue)
    }

    fn find_user(&mut self) -> io::Result<Flow> {
        writeln!(self.output, "\n--- Find user by ID ---")?;
        let Some(id) = self.prompt_id()? else {
            return Ok(Flow::Exit);
        };
        let Ok(id) = id else {
            return Ok(Flow::Continue);
        };

        match self.service.find_user(id) {
            Ok(Some(user)) => self.print_user(&user)?,
            Ok(None) => writeln!(self.output, "User with ID {id} not found")?,
            Err(err) => self.report(&err)?,
        }
        Ok(Flow::Continue)
    }

    fn update_user(&mut self) -> io::Result<Flow> {
        writeln!(self.output, "\n--- Update user ---")?;
        let Some(id) = self.prompt_id()? else {
            return Ok(Flow::Exit);
        };
        let Ok(id) = id else {
            return Ok(Flow::Continue);
        };

        let mut user = match self.service.find_user(id) {
            Ok(Some(user)) => user,
            Ok(None) => {
                writeln!(self.output, "User with ID {id} not found")?;
                return Ok(Flow::Continue);
            }
            Err(err) => {
                self.report(&err)?;
                return Ok(Flow::Continue);
            }
        };

        writeln!(self.output, "\nCurrent data:")?;
        self.print_user(&user)?;
        writeln!(
            self.output,
            "\nEnter new values (leave empty to keep the current value):"
        )?;

        let Some(name) = self.prompt("New name: ")? else {
            return Ok(Flow::Exit);
        };
        let Some(email) = self.prompt("New email: ")? else {
            return Ok(Flow::Exit);
        };
        let Some(age_text) = self.prompt("New age: ")? else {
            return Ok(Flow::Exit);
        };
        let age = match non_empty(age_text).map(|text| text.trim().parse::<i32>()) {
            None => None,
            Some(Ok(age)) => Some(age),
            Some(Err(_)) => {
                writeln!(self.output, "Error: age must be a number")?;
                return Ok(Flow::Continue);
            }
        };
        let patch = UserPatch {
            name: non_empty(name),
            email: non_empty(email).map(|email| email.trim().to_string()),
            age,
        };

        let Some(confirmation) = self.prompt("Confirm update (y/n): ")? else {
            return Ok(Flow::Exit);
        };
        if !confirmation.trim().eq_ignore_ascii_case("y") {
            writeln!(self.output, "Update cancelled")?;
            return Ok(Flow::Continue);
        }

        patch.apply_to(&mut user);
        match self.service.update_user(&user) {
            Ok(()) => writeln!(self.output, "User updated")?,
            Err(err) => self.report(&err)?,
        }
        Ok(Flow::Continue)
    }

    fn delete_user(&mut self) -> io::Result<Flow> {
        writeln!(self.output, "\n--- Delete user ---")?;
        let Some(id) = self.prompt_id()? else {
            return Ok(Flow::Exit);
        };
        let Ok(id) = id else {
            return Ok(Flow::Continue);
        };

        match self.service.delete_user(id) {
            Ok(_) => writeln!(self.output, "User with ID {id} deleted")?,
            Err(err) => self.report(&err)?,
        }
        Ok(Flow::Continue)
    }

    fn list_users(&mut self) -> io::Result<Flow> {
        writeln!(self.output, "\n--- All users ---")?;
        match self.service.list_users() {
            Ok(users) if users.is_empty() => writeln!(self.output, "No users found")?,
            Ok(users) => {
                for user in &users {
                    self.print_user(user)?;
                }
            }
            Err(err) => self.report(&err)?,
        }
        Ok(Flow::Continue)
    }

    fn print_user(&mut self, user: &User) -> io::Result<()> {
        writeln!(self.output, "\nID: {}", display_id(user.id))?;
        writeln!(self.output, "Name: {}", user.name)?;
        writeln!(self.output, "Email: {}", user.email)?;
        writeln!(self.output, "Age: {}", user.age)?;
        match user.created_at {
            Some(created_at) => writeln!(self.output, "Created at (epoch ms): {created_at}"),
            None => writeln!(self.output, "Created at: -"),
        }
    }

    fn report(&mut self, err: &RepoError) -> io::Result<()> {
        writeln!(self.output, "{}", describe_error(err))
    }

    /// Reads one id. Outer `None` is end of input; inner `Err` means the text
    /// was not a number and the message has already been printed.
    fn prompt_id(&mut self) -> io::Result<Option<Result<UserId, ()>>> {
        let Some(text) = self.prompt("ID: ")? else {
            return Ok(None);
        };
        match text.trim().parse::<UserId>() {
            Ok(id) => Ok(Some(Ok(id))),
            Err(_) => {
                writeln!(self.output, "Error: ID must be a number")?;
                Ok(Some(Err(())))
            }
        }
    }

    fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.output, "{label}")?;
        self.output.flush()?;
        self.read_line()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed_len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed_len);
        Ok(Some(line))
    }
}

/// Maps repository errors to the message shown to the operator.
pub fn describe_error(err: &RepoError) -> String {
    match err {
        RepoError::InvalidArgument(message) => format!("Invalid input: {message}"),
        RepoError::NotFound(id) => format!("User with ID {id} not found"),
        RepoError::DuplicateEmail(email) => format!("Error: email {email} already exists"),
        RepoError::Validation(err) => format!("Validation error: {err}"),
        other => format!("Storage error: {other}"),
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn display_id(id: Option<UserId>) -> String {
    id.map_or_else(|| "-".to_string(), |id| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::{describe_error, Console};
    use std::io::Cursor;
    use usermgr_core::db::open_db_in_memory;
    use usermgr_core::{RepoError, SqliteUserRepository, UserService};

    fn run_script<Repo: usermgr_core::UserRepository>(
        service: &UserService<Repo>,
        script: &str,
    ) -> String {
        let output = Console::new(Cursor::new(script.as_bytes()), Vec::new(), service)
            .run()
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn create_then_list_shows_user() {
        let conn = open_db_in_memory().unwrap();
        let service = UserService::new(SqliteUserRepository::try_new(&conn).unwrap());

        let output = run_script(&service, "1\nTest\ntest@example.com\n30\n5\n0\n");

        assert!(output.contains("User created. ID: 1"), "{output}");
        assert!(output.contains("Email: test@example.com"), "{output}");
        assert!(output.contains("Age: 30"), "{output}");
        assert!(output.ends_with("Bye\n"));
    }

    #[test]
    fn duplicate_email_is_reported() {
        let conn = open_db_in_memory().unwrap();
        let service = UserService::new(SqliteUserRepository::try_new(&conn).unwrap());

        let output = run_script(
            &service,
            "1\nA\ndup@example.com\n20\n1\nB\ndup@example.com\n21\n0\n",
        );

        assert!(output.contains("Error: email dup@example.com already exists"));
        assert_eq!(service.list_users().unwrap().len(), 1);
    }

    #[test]
    fn non_numeric_input_returns_to_menu() {
        let conn = open_db_in_memory().unwrap();
        let service = UserService::new(SqliteUserRepository::try_new(&conn).unwrap());

        let output = run_script(&service, "1\nA\na@example.com\nold\n2\nabc\n7\n0\n");

        assert!(output.contains("Error: age must be a number"));
        assert!(output.contains("Error: ID must be a number"));
        assert!(output.contains("Unknown choice `7`"));
        assert!(service.list_users().unwrap().is_empty());
    }

    #[test]
    fn find_reports_missing_and_invalid_ids() {
        let conn = open_db_in_memory().unwrap();
        let service = UserService::new(SqliteUserRepository::try_new(&conn).unwrap());

        let output = run_script(&service, "2\n5\n2\n0\n0\n");

        assert!(output.contains("User with ID 5 not found"));
        assert!(output.contains("Invalid input: user id must be positive"));
    }

    #[test]
    fn update_requires_confirmation() {
        let conn = open_db_in_memory().unwrap();
        let service = UserService::new(SqliteUserRepository::try_new(&conn).unwrap());
        let user = service.create_user("Old", "old@example.com", 40).unwrap();

        let output = run_script(&service, "3\n1\nNew\n\n\nn\n0\n");
        assert!(output.contains("Update cancelled"));
        assert_eq!(service.find_user(1).unwrap().unwrap(), user);

        let output = run_script(&service, "3\n1\nNew\n\n41\ny\n0\n");
        assert!(output.contains("User updated"));
        let stored = service.find_user(1).unwrap().unwrap();
        assert_eq!(stored.name, "New");
        assert_eq!(stored.email, "old@example.com");
        assert_eq!(stored.age, 41);
        assert_eq!(stored.created_at, user.created_at);
    }

    #[test]
    fn update_with_invalid_age_reports_validation_error() {
        let conn = open_db_in_memory().unwrap();
        let service = UserService::new(SqliteUserRepository::try_new(&conn).unwrap());
        service.create_user("Old", "old@example.com", 40).unwrap();

        let output = run_script(&service, "3\n1\n\n\n200\ny\n0\n");

        assert!(output.contains("Validation error: age (200) must be between 0 and 120"));
        assert_eq!(service.find_user(1).unwrap().unwrap().age, 40);
    }

    #[test]
    fn delete_removes_user_and_reports_missing() {
        let conn = open_db_in_memory().unwrap();
        let service = UserService::new(SqliteUserRepository::try_new(&conn).unwrap());
        service.create_user("Gone", "gone@example.com", 40).unwrap();

        let output = run_script(&service, "4\n1\n4\n1\n5\n0\n");

        assert!(output.contains("User with ID 1 deleted"));
        assert!(output.contains("User with ID 1 not found"));
        assert!(output.contains("No users found"));
    }

    #[test]
    fn end_of_input_exits_cleanly() {
        let conn = open_db_in_memory().unwrap();
        let service = UserService::new(SqliteUserRepository::try_new(&conn).unwrap());

        let output = run_script(&service, "1\nHalf");
        assert!(output.ends_with("Bye\n"));
        assert!(service.list_users().unwrap().is_empty());
    }

    #[test]
    fn describe_error_covers_each_category() {
        assert_eq!(
            describe_error(&RepoError::NotFound(3)),
            "User with ID 3 not found"
        );
        assert!(describe_error(&RepoError::InvalidArgument("x")).starts_with("Invalid input"));
        assert!(describe_error(&RepoError::InvalidData("x".to_string()))
            .starts_with("Storage error"));
    }
}
