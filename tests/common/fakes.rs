//! In-process fakes for the identity provider and the profile store
//!
//! Both fakes keep their state behind `std::sync::Mutex` and never hold a
//! lock across an await point.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

use whogofixam::client::{
    AuthError, Identity, IdentityProvider, PhoneConfirmation, ProfileStore, ProfileUpdate,
    StoreError,
};
use whogofixam::shared::UserProfile;

/// Code accepted by [`FakeIdentityProvider::confirm_phone`]
pub const VALID_CODE: &str = "123456";

#[derive(Debug, Clone)]
struct Account {
    password: String,
    identity: Identity,
}

/// Identity provider backed by a map of accounts
pub struct FakeIdentityProvider {
    session: watch::Sender<Option<Identity>>,
    accounts: Mutex<HashMap<String, Account>>,
    unavailable: AtomicBool,
    next_uid: AtomicU32,
}

impl Default for FakeIdentityProvider {
    fn default() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            session,
            accounts: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            next_uid: AtomicU32::new(1),
        }
    }
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, email: &str, password: &str, uid: &str) -> Self {
        let identity = Identity::new(uid).with_email(email);
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity,
            },
        );
        self
    }

    /// Fail every call with `unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Emit an identity change without a sign-in call, e.g. a restored session
    pub fn emit(&self, identity: Option<Identity>) {
        self.session.send_replace(identity);
    }

    fn check_available(&self) -> Result<(), AuthError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(AuthError::Unavailable("identity provider unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.check_available()?;
        let identity = {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(email) {
                return Err(AuthError::credential("EMAIL_EXISTS", "EMAIL_EXISTS"));
            }
            let uid = format!("uid-{}", self.next_uid.fetch_add(1, Ordering::SeqCst));
            let identity = Identity::new(uid).with_email(email);
            accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    identity: identity.clone(),
                },
            );
            identity
        };
        self.emit(Some(identity.clone()));
        Ok(identity)
    }

    async fn set_display_name(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> Result<Identity, AuthError> {
        self.check_available()?;
        let updated = identity.clone().with_display_name(display_name);
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(account) = accounts.values_mut().find(|a| a.identity.uid == updated.uid) {
            account.identity = updated.clone();
        }
        Ok(updated)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.check_available()?;
        let identity = {
            let accounts = self.accounts.lock().unwrap();
            match accounts.get(email) {
                None => return Err(AuthError::credential("EMAIL_NOT_FOUND", "EMAIL_NOT_FOUND")),
                Some(account) if account.password != password => {
                    return Err(AuthError::credential("INVALID_PASSWORD", "INVALID_PASSWORD"))
                }
                Some(account) => account.identity.clone(),
            }
        };
        self.emit(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.emit(None);
        Ok(())
    }

    async fn send_phone_verification(
        &self,
        phone_number: &str,
        _challenge: &str,
    ) -> Result<PhoneConfirmation, AuthError> {
        self.check_available()?;
        if !phone_number.starts_with('+') {
            return Err(AuthError::credential(
                "INVALID_PHONE_NUMBER",
                "INVALID_PHONE_NUMBER",
            ));
        }
        Ok(PhoneConfirmation {
            phone_number: phone_number.to_string(),
            session_info: format!("session-{}", phone_number),
        })
    }

    async fn confirm_phone(
        &self,
        confirmation: &PhoneConfirmation,
        code: &str,
    ) -> Result<Identity, AuthError> {
        self.check_available()?;
        if code != VALID_CODE {
            return Err(AuthError::credential("INVALID_CODE", "INVALID_CODE"));
        }
        let digits: String = confirmation
            .phone_number
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        let identity =
            Identity::new(format!("phone-{}", digits)).with_phone_number(&confirmation.phone_number);
        self.emit(Some(identity.clone()));
        Ok(identity)
    }

    fn current(&self) -> Option<Identity> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}

/// Scripted behavior of one `read_profile` call
#[derive(Debug, Clone)]
pub enum ReadStep {
    /// Never answer; the caller's timeout fires
    Hang,
    /// Answer from the documents after a delay
    Delay(Duration),
    Fail(StoreError),
}

/// Remote write observed by [`FakeProfileStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedWrite {
    Replace(String, UserProfile),
    Update(String, ProfileUpdate),
}

/// Profile store backed by a map of documents
///
/// Reads consume the script front to back and answer from the documents
/// once it is empty.
pub struct FakeProfileStore {
    documents: Mutex<HashMap<String, UserProfile>>,
    script: Mutex<VecDeque<ReadStep>>,
    writes: Mutex<Vec<RecordedWrite>>,
    write_delay: Mutex<Option<Duration>>,
    fail_writes: AtomicBool,
    write_error: Mutex<Option<StoreError>>,
    network_enabled: AtomicBool,
    reads: AtomicU32,
}

impl Default for FakeProfileStore {
    fn default() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            script: Mutex::new(VecDeque::new()),
            writes: Mutex::new(Vec::new()),
            write_delay: Mutex::new(None),
            fail_writes: AtomicBool::new(false),
            write_error: Mutex::new(None),
            network_enabled: AtomicBool::new(true),
            reads: AtomicU32::new(0),
        }
    }
}

impl FakeProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, profile: UserProfile) -> Self {
        self.insert_document(profile);
        self
    }

    pub fn insert_document(&self, profile: UserProfile) {
        self.documents
            .lock()
            .unwrap()
            .insert(profile.uid.clone(), profile);
    }

    pub fn document(&self, uid: &str) -> Option<UserProfile> {
        self.documents.lock().unwrap().get(uid).cloned()
    }

    pub fn script(&self, steps: impl IntoIterator<Item = ReadStep>) {
        self.script.lock().unwrap().extend(steps);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Reject every write with `error`
    pub fn set_write_error(&self, error: StoreError) {
        *self.write_error.lock().unwrap() = Some(error);
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn is_network_enabled(&self) -> bool {
        self.network_enabled.load(Ordering::SeqCst)
    }

    fn check_network(&self) -> Result<(), StoreError> {
        if self.is_network_enabled() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("network disabled".to_string()))
        }
    }

    async fn before_write(&self) -> Result<(), StoreError> {
        self.check_network()?;
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write rejected".to_string()));
        }
        match self.write_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProfileStore for FakeProfileStore {
    async fn read_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_network()?;
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(ReadStep::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Some(ReadStep::Delay(delay)) => tokio::time::sleep(delay).await,
            Some(ReadStep::Fail(error)) => return Err(error),
            None => {}
        }
        Ok(self.document(uid))
    }

    async fn write_profile(&self, uid: &str, profile: &UserProfile) -> Result<(), StoreError> {
        self.before_write().await?;
        self.insert_document(profile.clone());
        self.writes
            .lock()
            .unwrap()
            .push(RecordedWrite::Replace(uid.to_string(), profile.clone()));
        Ok(())
    }

    async fn update_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<(), StoreError> {
        self.before_write().await?;
        {
            let mut documents = self.documents.lock().unwrap();
            let document = documents
                .get_mut(uid)
                .ok_or_else(|| StoreError::NotFound(uid.to_string()))?;
            update.apply_to(document);
        }
        self.writes
            .lock()
            .unwrap()
            .push(RecordedWrite::Update(uid.to_string(), update.clone()));
        Ok(())
    }

    async fn enable_network(&self) -> Result<(), StoreError> {
        self.network_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disable_network(&self) -> Result<(), StoreError> {
        self.network_enabled.store(false, Ordering::SeqCst);
        Ok(())
    }
}
