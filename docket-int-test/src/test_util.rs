use docket::common::{read_field, write_field, Convertible, Value};
use docket::document::Document;
use docket::document_store::DocumentStore;
use docket::errors::DocketResult;
use docket::session::DocumentEntity;
use docket::transport::InMemoryTransport;
use std::backtrace::Backtrace;
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

static LOGGER: Once = Once::new();

/// Runs a test with retry logic and error handling.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> DocketResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> DocketResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> DocketResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => match after(ctx) {
                        Ok(_) => Ok(()),
                        Err(e) => Err((format!("After run failed: {:?}", e), backtrace.to_string())),
                    },
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_error = Some(e.clone());
                last_backtrace = Some(bt);
                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Error: {}", e);
                    thread::sleep(Duration::from_millis(50 * attempt as u64));
                }
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                last_error = Some(format!("Panic: {}", err_msg));
                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Panic: {}", err_msg);
                    thread::sleep(Duration::from_millis(50 * attempt as u64));
                }
            }
        }
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

#[derive(Clone)]
pub struct TestContext {
    store: DocumentStore,
    transport: InMemoryTransport,
}

impl TestContext {
    pub fn new(store: DocumentStore, transport: InMemoryTransport) -> Self {
        Self { store, transport }
    }

    pub fn store(&self) -> DocumentStore {
        self.store.clone()
    }

    pub fn transport(&self) -> InMemoryTransport {
        self.transport.clone()
    }
}

pub fn init_logging() {
    LOGGER.call_once(colog::init);
}

/// A store over a fresh in-memory transport, without optimistic concurrency.
pub fn create_test_context() -> DocketResult<TestContext> {
    create_context(false)
}

/// A store over a fresh in-memory transport that checks etags on every write.
pub fn create_optimistic_test_context() -> DocketResult<TestContext> {
    create_context(true)
}

fn create_context(optimistic: bool) -> DocketResult<TestContext> {
    init_logging();
    let transport = InMemoryTransport::new();
    let store = DocumentStore::builder()
        .transport(transport.clone())
        .identifier(&format!("test-{}", uuid::Uuid::new_v4()))
        .use_optimistic_concurrency(optimistic)
        .build()?;
    Ok(TestContext::new(store, transport))
}

pub fn cleanup(_ctx: TestContext) -> DocketResult<()> {
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Option<String>,
    pub name: String,
    pub age: i64,
}

impl User {
    pub fn new(name: &str, age: i64) -> Self {
        User {
            id: None,
            name: name.to_string(),
            age,
        }
    }
}

impl Convertible for User {
    type Output = User;

    fn to_value(&self) -> DocketResult<Value> {
        let mut doc = Document::new();
        write_field(&mut doc, "id", &self.id)?;
        write_field(&mut doc, "name", &self.name)?;
        write_field(&mut doc, "age", &self.age)?;
        Ok(Value::Document(doc))
    }

    fn from_value(value: &Value) -> DocketResult<Self::Output> {
        let doc = Document::from_value(value)?;
        Ok(User {
            id: read_field::<Option<String>>(&doc, "id")?,
            name: read_field::<String>(&doc, "name")?,
            age: read_field::<i64>(&doc, "age")?,
        })
    }
}

impl DocumentEntity for User {
    fn document_id(&self) -> Option<String> {
        self.id.clone()
    }

    fn set_document_id(&mut self, id: &str) {
        self.id = Some(id.to_string());
    }
}

/// An order referencing a customer and products, keyed by `order_no`.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_no: Option<String>,
    pub customer: String,
    pub products: Vec<String>,
}

impl Convertible for Order {
    type Output = Order;

    fn to_value(&self) -> DocketResult<Value> {
        let mut doc = Document::new();
        write_field(&mut doc, "order_no", &self.order_no)?;
        write_field(&mut doc, "customer", &self.customer)?;
        write_field(&mut doc, "products", &self.products)?;
        Ok(Value::Document(doc))
    }

    fn from_value(value: &Value) -> DocketResult<Self::Output> {
        let doc = Document::from_value(value)?;
        Ok(Order {
            order_no: read_field::<Option<String>>(&doc, "order_no")?,
            customer: read_field::<String>(&doc, "customer")?,
            products: read_field::<Vec<String>>(&doc, "products")?,
        })
    }
}

impl DocumentEntity for Order {
    fn identity_field(&self) -> Option<String> {
        Some("order_no".to_string())
    }

    fn document_id(&self) -> Option<String> {
        self.order_no.clone()
    }

    fn set_document_id(&mut self, id: &str) {
        self.order_no = Some(id.to_string());
    }
}
