//! Per-tab session state and event dispatch.
//!
//! Everything one browser tab owns lives in a [`Session`]: the profile, the
//! saved program cards and the active panel. The chat history belongs to a
//! companion [`ChatWorker`] task, so a reply streaming from the model never
//! holds up panel or card events. The web layer creates one session per
//! WebSocket connection and shuts it down when the socket closes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::advisor::Advisor;
use crate::chat::ChatHistory;
use crate::panel::{Panel, PanelController};
use crate::profile::{self, Profile};
use crate::programs::ProgramBoard;
use crate::protocol::{ClientEvent, Phase, ServerEvent};

/// Sends `event` to the browser. Returns false once the socket side is gone.
pub fn publish(out: &UnboundedSender<ServerEvent>, event: ServerEvent) -> bool {
    match out.send(event) {
        Ok(()) => true,
        Err(_) => {
            debug!("Session output closed; dropping event");
            false
        }
    }
}

/// Work queued for the chat worker. Commands run one at a time, in order.
#[derive(Debug)]
enum ChatCommand {
    Seed(ChatHistory),
    Send(String),
}

/// Owns the chat history and runs one model exchange at a time.
struct ChatWorker {
    advisor: Arc<Advisor>,
    history: ChatHistory,
    out: UnboundedSender<ServerEvent>,
}

impl ChatWorker {
    async fn run(mut self, mut commands: UnboundedReceiver<ChatCommand>) -> ChatHistory {
        while let Some(command) = commands.recv().await {
            match command {
                ChatCommand::Seed(history) => self.history = history,
                ChatCommand::Send(text) => {
                    if let Err(e) = self.reply(&text).await {
                        error!("Chat exchange failed: {:?}", e);
                        publish(&self.out, ServerEvent::Error { message: format!("{:#}", e) });
                    }
                }
            }
            if self.out.is_closed() {
                debug!("Socket gone; chat worker stopping");
                break;
            }
        }
        self.history
    }

    async fn reply(&mut self, text: &str) -> Result<()> {
        let updates = self.advisor.send(text, &mut self.history);
        tokio::pin!(updates);
        while let Some(update) = updates.next().await {
            let update = update.context("Advisor reply failed")?;
            let event = ServerEvent::Transcript {
                turns: update.transcript,
                streaming: !update.complete,
            };
            if !publish(&self.out, event) {
                // dropping the stream abandons the exchange before it is committed
                break;
            }
        }
        Ok(())
    }
}

pub struct Session {
    loading_delay: Duration,
    phase: Phase,
    profile: Option<Profile>,
    programs: ProgramBoard,
    panels: PanelController,
    out: UnboundedSender<ServerEvent>,
    chat_tx: UnboundedSender<ChatCommand>,
    chat_task: JoinHandle<ChatHistory>,
}

impl Session {
    /// Creates the session and spawns its chat worker. Must be called inside
    /// a tokio runtime.
    pub fn new(advisor: Arc<Advisor>, loading_delay: Duration, out: UnboundedSender<ServerEvent>) -> Self {
        let (chat_tx, chat_rx) = mpsc::unbounded_channel();
        let worker = ChatWorker {
            advisor,
            history: ChatHistory::new(),
            out: out.clone(),
        };
        let chat_task = tokio::spawn(worker.run(chat_rx));
        Self {
            loading_delay,
            phase: Phase::Intro,
            profile: None,
            programs: ProgramBoard::new(),
            panels: PanelController::new(),
            out,
            chat_tx,
            chat_task,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn programs(&self) -> &ProgramBoard {
        &self.programs
    }

    pub fn active_panel(&self) -> Panel {
        self.panels.active()
    }

    /// Applies one client event.
    ///
    /// Chat messages are queued for the worker and this returns right away;
    /// their transcript updates and any completion error arrive on `out`
    /// later. Everything else is answered before this returns.
    pub async fn handle(&mut self, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Start { profile } => self.start(profile).await,
            ClientEvent::Send { text } => {
                self.enqueue(text);
                Ok(())
            }
            ClientEvent::QuickAction { action } => {
                self.enqueue(action.prompt().to_string());
                Ok(())
            }
            ClientEvent::SelectPanel { panel } => {
                let view = self.panels.select(panel);
                publish(&self.out, ServerEvent::Panel { view });
                Ok(())
            }
            ClientEvent::AddProgram { school, program } => {
                self.programs.add(school, program);
                self.publish_programs()
            }
            ClientEvent::DeleteProgram { index } => {
                if self.programs.delete_at(index).is_none() {
                    debug!(index, "Ignoring delete for a card that is not on the board");
                }
                self.publish_programs()
            }
            ClientEvent::RemoveProgram { id } => {
                if self.programs.remove(id).is_none() {
                    debug!(%id, "Ignoring remove for a card that is not on the board");
                }
                self.publish_programs()
            }
        }
    }

    /// Lets queued chat messages finish, then returns the final history.
    pub async fn close(self) -> ChatHistory {
        let Session { chat_tx, chat_task, .. } = self;
        drop(chat_tx);
        match chat_task.await {
            Ok(history) => history,
            Err(e) => {
                warn!("Chat worker did not finish cleanly: {}", e);
                ChatHistory::new()
            }
        }
    }

    /// Cancels any reply in flight. Used when the socket is already gone.
    pub fn abort(self) {
        self.chat_task.abort();
    }

    async fn start(&mut self, profile: Profile) -> Result<()> {
        if self.phase != Phase::Intro {
            warn!("Profile already submitted for this session; ignoring start");
            return Ok(());
        }
        let started = profile::start(&profile);
        info!(grade = ?profile.grade, interests = profile.interests.len(), "Starting advisor session");

        self.profile = Some(profile);
        if self.chat_tx.send(ChatCommand::Seed(started.history)).is_err() {
            warn!("Chat worker has stopped; welcome history not seeded");
        }
        self.phase = Phase::Loading;
        publish(&self.out, ServerEvent::Phase { phase: Phase::Loading });
        publish(
            &self.out,
            ServerEvent::Transcript {
                turns: started.transcript,
                streaming: false,
            },
        );

        tokio::time::sleep(self.loading_delay).await;

        self.phase = Phase::Chat;
        publish(&self.out, ServerEvent::Phase { phase: Phase::Chat });
        publish(&self.out, ServerEvent::Panel { view: self.panels.view() });
        self.publish_programs()
    }

    fn enqueue(&self, text: String) {
        if text.trim().is_empty() {
            debug!("Ignoring blank chat message");
            return;
        }
        if self.chat_tx.send(ChatCommand::Send(text)).is_err() {
            debug!("Chat worker has stopped; dropping message");
        }
    }

    fn publish_programs(&self) -> Result<()> {
        let html = self.programs.render().context("Failed to render program cards")?;
        publish(
            &self.out,
            ServerEvent::Programs {
                cards: self.programs.cards().to_vec(),
                html,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::ChatSettings;
    use crate::chat::Role;
    use crate::completion::OpenAiClient;
    use crate::profile::Grade;

    // Points at a closed port, so any chat attempt fails fast.
    fn session() -> (Session, UnboundedReceiver<ServerEvent>) {
        let backend = Arc::new(OpenAiClient::new("http://127.0.0.1:9/v1", ""));
        let advisor = Arc::new(Advisor::new(backend, ChatSettings::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(advisor, Duration::ZERO, tx), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_start_moves_through_loading_to_chat() {
        let (mut session, mut rx) = session();
        let profile = Profile {
            grade: Some(Grade::Tenth),
            ..Profile::default()
        };
        session.handle(ClientEvent::Start { profile }).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events[0], ServerEvent::Phase { phase: Phase::Loading });
        match &events[1] {
            ServerEvent::Transcript { turns, streaming } => {
                assert!(!streaming);
                assert_eq!(turns.len(), 1);
                assert!(turns[0].assistant.contains("grade 10th"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(events[2], ServerEvent::Phase { phase: Phase::Chat });
        assert!(matches!(events[3], ServerEvent::Panel { .. }));
        assert!(matches!(events[4], ServerEvent::Programs { .. }));
        assert_eq!(session.phase(), Phase::Chat);

        let history = session.close().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_second_start_is_ignored() {
        let (mut session, mut rx) = session();
        session.handle(ClientEvent::Start { profile: Profile::default() }).await.unwrap();
        drain(&mut rx);
        let other = Profile {
            school: "Elsewhere".to_string(),
            ..Profile::default()
        };
        session.handle(ClientEvent::Start { profile: other }).await.unwrap();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(session.profile().unwrap().school, "");
    }

    #[tokio::test]
    async fn test_blank_message_does_not_call_model() {
        let (mut session, mut rx) = session();
        session.handle(ClientEvent::Send { text: "   ".to_string() }).await.unwrap();
        let history = session.close().await;
        assert!(history.is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_program_cards_add_and_delete() {
        let (mut session, mut rx) = session();
        let add = |school: &str| ClientEvent::AddProgram {
            school: school.to_string(),
            program: "CS".to_string(),
        };
        session.handle(add("A")).await.unwrap();
        session.handle(add("B")).await.unwrap();
        session.handle(ClientEvent::DeleteProgram { index: 7 }).await.unwrap();
        assert_eq!(session.programs().len(), 2);

        let id = session.programs().cards()[0].id;
        session.handle(ClientEvent::RemoveProgram { id }).await.unwrap();
        assert_eq!(session.programs().cards()[0].school, "B");

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        match events.last().unwrap() {
            ServerEvent::Programs { cards, html } => {
                assert_eq!(cards.len(), 1);
                assert!(html.contains("B</strong>"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_select_panel_publishes_view() {
        let (mut session, mut rx) = session();
        session.handle(ClientEvent::SelectPanel { panel: Panel::Program }).await.unwrap();
        assert_eq!(session.active_panel(), Panel::Program);
        match &drain(&mut rx)[0] {
            ServerEvent::Panel { view } => assert!(view.program_visible && !view.interest_visible),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chat_failure_is_reported_as_error_event() {
        let (mut session, mut rx) = session();
        session.handle(ClientEvent::Send { text: "hi".to_string() }).await.unwrap();
        let history = session.close().await;
        assert!(history.is_empty());
        match &drain(&mut rx)[..] {
            [ServerEvent::Error { message }] => assert!(message.starts_with("Advisor reply failed")),
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_publish_reports_closed_output() {
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(publish(&tx, ServerEvent::Phase { phase: Phase::Chat }));
        drop(rx);
        assert!(!publish(&tx, ServerEvent::Phase { phase: Phase::Chat }));
    }

    #[tokio::test]
    async fn test_closed_output_does_not_fail_events() {
        let (mut session, rx) = session();
        drop(rx);
        session.handle(ClientEvent::SelectPanel { panel: Panel::Program }).await.unwrap();
        session.handle(add_program()).await.unwrap();
        session.handle(ClientEvent::Send { text: "hi".to_string() }).await.unwrap();
        // the worker stops on its own once it sees the socket is gone
        let history = tokio::time::timeout(Duration::from_secs(5), session.close())
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    fn add_program() -> ClientEvent {
        ClientEvent::AddProgram {
            school: "McGill".to_string(),
            program: "Biology".to_string(),
        }
    }
}
