/*!
Fee agreements and the payments made against them.

`total_paid` and `balance` are derived from `payments` and `agreed_amount`;
the only way to change them is [`FeeRecord::append_payment()`].
*/
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::store::Record;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub amount: f64,
    #[serde(with = "crate::dates::day")]
    pub date: Date,
    #[serde(default)]
    pub notes: String,
    #[serde(with = "crate::dates::stamp")]
    pub added_at: OffsetDateTime,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecord {
    #[serde(default, skip_serializing)]
    pub id: String,
    /// Document id of the student.
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub agreed_amount: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default)]
    total_paid: f64,
    #[serde(default)]
    balance: f64,
    #[serde(default, with = "crate::dates::stamp::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "crate::dates::stamp::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// A payment amount must be a finite, non-negative number.
pub fn check_amount(amount: f64) -> Result<(), String> {
    if !amount.is_finite() {
        Err(format!("Payment amount {} is not a finite number.", amount))
    } else if amount < 0.0 {
        Err(format!("Payment amount {} is negative.", amount))
    } else {
        Ok(())
    }
}

impl FeeRecord {
    pub fn new(student_id: &str, agreed_amount: f64, description: &str) -> Self {
        Self {
            id: String::new(),
            student_id: student_id.to_owned(),
            agreed_amount,
            description: description.to_owned(),
            payments: Vec::new(),
            total_paid: 0.0,
            balance: agreed_amount,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn total_paid(&self) -> f64 { self.total_paid }

    pub fn balance(&self) -> f64 { self.balance }

    /// Appends `p` and recomputes the totals from the full payment list.
    pub fn append_payment(&mut self, p: Payment) -> Result<(), String> {
        check_amount(p.amount)?;
        self.payments.push(p);
        self.recompute();
        Ok(())
    }

    fn recompute(&mut self) {
        self.total_paid = self.payments.iter().map(|p| p.amount).sum();
        self.balance = self.agreed_amount - self.total_paid;
    }
}

impl Record for FeeRecord {
    const KIND: &'static str = "Fee record";

    fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;
    use serde_json::json;
    use time::macros::{date, datetime};

    fn payment(amount: f64) -> Payment {
        Payment {
            amount,
            date: date!(2024-02-01),
            notes: String::new(),
            added_at: datetime!(2024-02-01 10:00 UTC),
        }
    }

    #[test]
    fn fresh_record_owes_everything() {
        let f = FeeRecord::new("stu", 1200.0, "Term 1 tuition");
        assert!(approx_eq!(f64, f.total_paid(), 0.0));
        assert!(approx_eq!(f64, f.balance(), 1200.0));
    }

    #[test]
    fn payments_accumulate() {
        let mut f = FeeRecord::new("stu", 1000.0, "");
        let mut prior = 0.0;
        for a in [0.0, 250.5, 100.25, 900.0] {
            f.append_payment(payment(a)).unwrap();
            prior += a;
            assert!(approx_eq!(f64, f.total_paid(), prior, ulps = 4));
            assert!(approx_eq!(f64, f.balance(), 1000.0 - prior, ulps = 4));
        }
        assert_eq!(f.payments.len(), 4);
        // Overpayment leaves a negative balance; that is a credit, not an error.
        assert!(f.balance() < 0.0);
    }

    #[test]
    fn bad_amounts_rejected() {
        let mut f = FeeRecord::new("stu", 10.0, "");
        assert!(f.append_payment(payment(-1.0)).is_err());
        assert!(f.append_payment(payment(f64::NAN)).is_err());
        assert!(f.append_payment(payment(f64::INFINITY)).is_err());
        assert!(f.payments.is_empty());
        assert!(approx_eq!(f64, f.balance(), 10.0));
    }

    #[test]
    fn stored_totals_get_recomputed() {
        // Totals that disagree with the payment list are replaced on append.
        let mut f: FeeRecord = serde_json::from_value(json!({
            "studentId": "stu",
            "agreedAmount": 500.0,
            "payments": [{
                "amount": 100.0,
                "date": "2024-01-10",
                "notes": "cash",
                "addedAt": "2024-01-10T08:00:00.000000000+00:00",
            }],
            "totalPaid": 999.0,
            "balance": -499.0,
        })).unwrap();

        f.append_payment(payment(50.0)).unwrap();
        assert!(approx_eq!(f64, f.total_paid(), 150.0));
        assert!(approx_eq!(f64, f.balance(), 350.0));
    }
}
