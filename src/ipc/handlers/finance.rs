use crate::audit;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{actor, db_conn, opt_str, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::records::{
    Invoice, StaffStatus, Transaction, INVOICE_COLUMNS, INVOICE_PAID, INVOICE_UNPAID,
    TRANSACTION_COLUMNS,
};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;

use super::staff::list_staff;
use super::students::load_student;

const KIND_INCOME: &str = "Income";
const KIND_EXPENSE: &str = "Expense";
const TRANSACTION_PAID: &str = "Paid";

fn load_invoice(conn: &Connection, invoice_id: &str) -> Result<Invoice, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM invoices WHERE id = ?", INVOICE_COLUMNS),
        [invoice_id],
        Invoice::from_row,
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("Invoice not found"))
}

fn canonical_invoice_status(raw: &str) -> Result<&'static str, HandlerErr> {
    match raw.to_ascii_lowercase().as_str() {
        "unpaid" => Ok(INVOICE_UNPAID),
        "paid" => Ok(INVOICE_PAID),
        _ => Err(HandlerErr::bad_params("status must be one of: Unpaid, Paid")),
    }
}

fn parse_date(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    let Some(raw) = opt_str(params, key)? else {
        return Ok(None);
    };
    chrono::NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))?;
    Ok(Some(raw))
}

fn today() -> String {
    chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

fn handle_invoices_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mut sql = format!("SELECT {} FROM invoices WHERE 1 = 1", INVOICE_COLUMNS);
    let mut bind: Vec<Value> = Vec::new();
    if let Some(student_id) = opt_str(&req.params, "studentId")? {
        sql.push_str(" AND student_id = ?");
        bind.push(Value::Text(student_id));
    }
    if let Some(status) = opt_str(&req.params, "status")? {
        sql.push_str(" AND status = ?");
        bind.push(Value::Text(canonical_invoice_status(&status)?.to_string()));
    }
    sql.push_str(" ORDER BY created_at, id");
    let mut stmt = conn.prepare(&sql)?;
    let invoices = stmt
        .query_map(params_from_iter(bind), Invoice::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "invoices": invoices }))
}

fn handle_invoices_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    load_student(conn, &student_id)?;
    let amount = required_i64(&req.params, "amount")?;
    if amount <= 0 {
        return Err(HandlerErr::bad_params("amount must be positive"));
    }
    let id = match opt_str(&req.params, "invoiceId")? {
        Some(id) => {
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM invoices WHERE id = ?", [&id], |r| r.get(0))
                .optional()?;
            if exists.is_some() {
                return Err(HandlerErr::conflict(format!("invoice {} already exists", id)));
            }
            id
        }
        None => db::new_id("inv"),
    };
    let invoice = Invoice {
        id,
        student_id,
        description: required_str(&req.params, "description")?,
        amount,
        status: INVOICE_UNPAID.to_string(),
        due_date: parse_date(&req.params, "dueDate")?,
        created_at: db::now_ts(),
    };
    conn.execute(
        "INSERT INTO invoices(id, student_id, description, amount, status, due_date, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &invoice.id,
            &invoice.student_id,
            &invoice.description,
            invoice.amount,
            &invoice.status,
            &invoice.due_date,
            &invoice.created_at,
        ),
    )?;
    Ok(json!({ "invoice": invoice }))
}

fn handle_record_payment(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let invoice_id = required_str(&req.params, "invoiceId")?;
    let actor = actor(&req.params)?;
    let mut invoice = load_invoice(conn, &invoice_id)?;
    if invoice.status == INVOICE_PAID {
        return Err(HandlerErr::conflict("Invoice already paid"));
    }

    let transaction = Transaction {
        id: db::new_id("trn"),
        kind: KIND_INCOME.to_string(),
        category: "Fees".to_string(),
        description: format!("Payment for {}", invoice.description),
        amount: invoice.amount,
        status: TRANSACTION_PAID.to_string(),
        invoice_id: Some(invoice.id.clone()),
        staff_id: None,
        date: today(),
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE invoices SET status = ? WHERE id = ?",
        (INVOICE_PAID, &invoice.id),
    )?;
    transaction.insert(&tx)?;
    audit::append(
        &tx,
        &actor,
        "finance.recordPayment",
        format!("invoice {} paid, amount {}", invoice.id, invoice.amount),
    )?;
    tx.commit()?;

    invoice.status = INVOICE_PAID.to_string();
    tracing::info!(invoice = %invoice.id, amount = invoice.amount, "payment recorded");
    Ok(json!({ "invoice": invoice, "transaction": transaction }))
}

fn handle_transactions_list(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mut sql = format!("SELECT {} FROM transactions WHERE 1 = 1", TRANSACTION_COLUMNS);
    let mut bind: Vec<Value> = Vec::new();
    if let Some(kind) = opt_str(&req.params, "kind")? {
        let kind = match kind.to_ascii_lowercase().as_str() {
            "income" => KIND_INCOME,
            "expense" => KIND_EXPENSE,
            _ => return Err(HandlerErr::bad_params("kind must be one of: Income, Expense")),
        };
        sql.push_str(" AND kind = ?");
        bind.push(Value::Text(kind.to_string()));
    }
    if let Some(invoice_id) = opt_str(&req.params, "invoiceId")? {
        sql.push_str(" AND invoice_id = ?");
        bind.push(Value::Text(invoice_id));
    }
    sql.push_str(" ORDER BY seq");
    let mut stmt = conn.prepare(&sql)?;
    let transactions = stmt
        .query_map(params_from_iter(bind), Transaction::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "transactions": transactions }))
}

fn handle_run_payroll(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let actor = actor(&req.params)?;
    let period = opt_str(&req.params, "period")?
        .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m").to_string());
    let staff = list_staff(conn, Some(StaffStatus::Active))?;

    let date = today();
    let transactions: Vec<Transaction> = staff
        .iter()
        .map(|s| Transaction {
            id: db::new_id("trn"),
            kind: KIND_EXPENSE.to_string(),
            category: "Salary".to_string(),
            description: format!("Salary {} for {} ({})", period, s.name, s.role),
            amount: s.salary,
            status: TRANSACTION_PAID.to_string(),
            invoice_id: None,
            staff_id: Some(s.id.clone()),
            date: date.clone(),
        })
        .collect();
    let total_amount = transactions
        .iter()
        .try_fold(0i64, |acc, t| acc.checked_add(t.amount))
        .ok_or_else(|| {
            HandlerErr::conflict(format!(
                "payroll total for {} active staff exceeds the supported amount",
                transactions.len()
            ))
        })?;

    let tx = conn.unchecked_transaction()?;
    for t in &transactions {
        t.insert(&tx)?;
    }
    audit::append(
        &tx,
        &actor,
        "finance.runPayroll",
        format!(
            "period {}: {} staff paid, total {}",
            period,
            transactions.len(),
            total_amount
        ),
    )?;
    tx.commit()?;

    tracing::info!(period = %period, processed = transactions.len(), total = total_amount, "payroll run");
    Ok(json!({
        "period": period,
        "processedCount": transactions.len(),
        "totalAmount": total_amount,
        "transactions": transactions
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "finance.invoices.list" => handle_invoices_list(state, req),
        "finance.invoices.create" => handle_invoices_create(state, req),
        "finance.recordPayment" => handle_record_payment(state, req),
        "finance.transactions.list" => handle_transactions_list(state, req),
        "finance.runPayroll" => handle_run_payroll(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
