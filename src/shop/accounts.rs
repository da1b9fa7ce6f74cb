//! Customer accounts: registration, login and profile updates

use rusqlite::params;
use tracing::{debug, info};

use super::Shop;
use super::records::Customer;
use crate::Result;
use crate::credentials::{password_digest, verify_password};
use crate::storage::{Applied, MutationResult};

/// Details for a new account
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub firstname: String,
    pub surname: String,
    pub gender: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Replacement profile for an existing account.
///
/// The password is only changed when one is given.
#[derive(Debug, Clone)]
pub struct CustomerUpdate {
    pub firstname: String,
    pub surname: String,
    pub gender: String,
    pub email: String,
    pub username: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    UnknownUser,
    WrongPassword,
    Authenticated(Customer),
}

impl Shop {
    /// Create an account; returns the new customer id.
    ///
    /// A taken username comes back as a duplicate failure.
    pub fn register(&self, customer: &NewCustomer) -> MutationResult<i64> {
        let digest = password_digest(&customer.password);
        let applied = self.gateway.mutate(
            "INSERT INTO Customers (Customer_Firstname, Customer_Surname, Customer_Gender,
                                    Customer_Email, Customer_Username, Customer_Password)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                customer.firstname,
                customer.surname,
                customer.gender,
                customer.email,
                customer.username,
                &digest[..],
            ],
        )?;
        info!("Registered customer {} ({})", customer.username, applied.last_insert_id);
        Ok(applied.last_insert_id)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        let Some(customer) = self.customer_by_username(username)? else {
            debug!("Login for unknown user {}", username);
            return Ok(LoginOutcome::UnknownUser);
        };
        if verify_password(password, &customer.password_digest) {
            Ok(LoginOutcome::Authenticated(customer))
        } else {
            Ok(LoginOutcome::WrongPassword)
        }
    }

    /// Rewrite the profile of the account currently called `current_username`
    pub fn update_customer(&self, current_username: &str, update: &CustomerUpdate) -> MutationResult<Applied> {
        match &update.password {
            Some(password) => {
                let digest = password_digest(password);
                self.gateway.mutate(
                    "UPDATE Customers SET Customer_Firstname = ?1, Customer_Surname = ?2,
                            Customer_Gender = ?3, Customer_Email = ?4, Customer_Username = ?5,
                            Customer_Password = ?6
                     WHERE Customer_Username = ?7",
                    params![
                        update.firstname,
                        update.surname,
                        update.gender,
                        update.email,
                        update.username,
                        &digest[..],
                        current_username,
                    ],
                )
            }
            None => self.gateway.mutate(
                "UPDATE Customers SET Customer_Firstname = ?1, Customer_Surname = ?2,
                        Customer_Gender = ?3, Customer_Email = ?4, Customer_Username = ?5
                 WHERE Customer_Username = ?6",
                params![
                    update.firstname,
                    update.surname,
                    update.gender,
                    update.email,
                    update.username,
                    current_username,
                ],
            ),
        }
    }

    pub fn customer(&self, id: i64) -> Result<Option<Customer>> {
        self.gateway
            .select_one("SELECT * FROM Customers WHERE Customer_ID = ?1", [id])?
            .as_ref()
            .map(Customer::try_from)
            .transpose()
    }

    pub fn customer_by_username(&self, username: &str) -> Result<Option<Customer>> {
        self.gateway
            .select_one("SELECT * FROM Customers WHERE Customer_Username = ?1", [username])?
            .as_ref()
            .map(Customer::try_from)
            .transpose()
    }
}
