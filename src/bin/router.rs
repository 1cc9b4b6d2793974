//! CLI entry point: wires a shared `Directory` + `ConnectionRegistry` to a
//! real `parity_ws` WebSocket listener. The library itself never touches a
//! socket (§6 "FrameSender interface") — this binary is the one place that
//! does.

use std::sync::Arc;

use argparse::{ArgumentParser, Store};
use log::info;
use parity_ws::{listen, CloseCode, Handler, Handshake, Message as WsMessage, Result as WsResult};

use intercom::connection::wamp::WampConnection;
use intercom::frame::WsFrameSender;
use intercom::{ConnectionRegistry, Directory, Uri};

struct ConnectionHandler {
    connection: Arc<WampConnection>,
}

impl Handler for ConnectionHandler {
    fn on_open(&mut self, _shake: Handshake) -> WsResult<()> {
        self.connection.welcome(None);
        Ok(())
    }

    fn on_message(&mut self, msg: WsMessage) -> WsResult<()> {
        if let WsMessage::Text(text) = msg {
            self.connection.process(&text);
        }
        Ok(())
    }

    fn on_close(&mut self, _code: CloseCode, _reason: &str) {
        self.connection.close();
    }
}

fn main() {
    env_logger::init();

    let mut listen_addr = "127.0.0.1:8090".to_string();
    let mut home_root = "/".to_string();
    {
        let mut parser = ArgumentParser::new();
        parser.set_description("Symmetric WAMP v1 peer router");
        parser
            .refer(&mut listen_addr)
            .add_option(&["-l", "--listen"], Store, "address to listen on");
        parser
            .refer(&mut home_root)
            .add_option(&["--home-root"], Store, "absolute path new connections are mounted under");
        parser.parse_args_or_exit();
    }

    let directory = Arc::new(Directory::new());
    let registry = Arc::new(ConnectionRegistry::new());

    info!("listening on {} (home root {})", listen_addr, home_root);
    listen(&listen_addr[..], |sender| {
        let connection = WampConnection::new(
            Uri::new(),
            home_root.clone(),
            Arc::new(WsFrameSender::new(sender)),
            directory.clone(),
            Some(registry.clone()),
        );
        ConnectionHandler { connection }
    })
    .unwrap();
}
