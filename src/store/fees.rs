/*!
`Store` methods for fee records and payments.
*/
use serde_json::{json, Value};
use time::Date;

use super::*;
use crate::fee::{check_amount, FeeRecord, Payment};

impl Store {
    pub async fn create_fee_record(
        &self,
        student_id: &str,
        agreed_amount: f64,
        description: &str,
    ) -> Result<String, Error> {
        log::trace!(
            "Store::create_fee_record( {:?}, {}, {:?} ) called.",
            student_id, agreed_amount, description
        );

        if !agreed_amount.is_finite() {
            return Err(Error::Invalid(format!(
                "Agreed amount {} is not a finite number.", agreed_amount
            )));
        }

        let mut data = to_object(&FeeRecord::new(student_id, agreed_amount, description))?;
        let now = now_value()?;
        let map = as_object(&mut data)?;
        map.insert("createdAt".to_owned(), now.clone());
        map.insert("updatedAt".to_owned(), now);

        let id = self.docs.add(FEES, data).await?;
        log::trace!("Inserted fee record {:?} for Student {:?}.", &id, student_id);
        Ok(id)
    }

    /**
    Append a payment to a fee record and recompute its totals.

    The whole read-append-write is one atomic step on the fee document, so
    concurrent payments against the same record all land.
    */
    pub async fn add_payment(
        &self,
        fee_id: &str,
        amount: f64,
        date: Date,
        notes: &str,
    ) -> Result<(), Error> {
        log::trace!(
            "Store::add_payment( {:?}, {}, {}, {:?} ) called.",
            fee_id, amount, &date, notes
        );

        check_amount(amount).map_err(Error::Invalid)?;

        let now = crate::dates::now();
        let stamp = now_value()?;
        let payment = Payment {
            amount,
            date,
            notes: notes.to_owned(),
            added_at: now,
        };
        let doc_id = fee_id.to_owned();

        let found = self.docs.modify(FEES, fee_id, Box::new(move |mut data: Value| -> Result<Value, DbError> {
            let mut fee: FeeRecord = Doc { id: doc_id, data: data.clone() }.decode()?;
            fee.append_payment(payment)?;

            let map = as_object(&mut data)?;
            map.insert("payments".to_owned(), serde_json::to_value(&fee.payments)?);
            map.insert("totalPaid".to_owned(), json!(fee.total_paid()));
            map.insert("balance".to_owned(), json!(fee.balance()));
            map.insert("updatedAt".to_owned(), stamp);
            Ok(data)
        })).await?;

        if found {
            Ok(())
        } else {
            Err(Error::not_found("Fee record", fee_id))
        }
    }

    pub async fn get_fee_record(&self, fee_id: &str) -> Result<Option<FeeRecord>, Error> {
        log::trace!("Store::get_fee_record( {:?} ) called.", fee_id);
        self.fetch(FEES, fee_id).await
    }

    /// A student's fee records, newest first.
    pub async fn fee_records_for_student(&self, student_id: &str) -> Result<Vec<FeeRecord>, Error> {
        log::trace!("Store::fee_records_for_student( {:?} ) called.", student_id);

        let q = Query::new(FEES)
            .eq("studentId", student_id)
            .order_by("createdAt", Direction::Desc);
        self.fetch_all(&q).await
    }

    /// Every fee record, most recently changed first.
    pub async fn all_fee_records(&self) -> Result<Vec<FeeRecord>, Error> {
        log::trace!("Store::all_fee_records() called.");

        let q = Query::new(FEES).order_by("updatedAt", Direction::Desc);
        self.fetch_all(&q).await
    }
}
