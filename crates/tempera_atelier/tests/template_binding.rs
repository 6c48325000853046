//! Template stamping, binding effects and client elements.

use std::cell::RefCell;
use std::rc::Rc;

use tempera_atelier::{
    Element, ElementDefinition, EngineError, Event, FlushState, PropertyDeclaration, Registry, Settings,
    Value,
};

type Log = Rc<RefCell<Vec<Value>>>;

fn registry() -> Registry {
    Registry::new(Settings {
        strict: true,
        ..Settings::default()
    })
}

fn ready(registry: &Registry, name: &str) -> Element {
    let el = registry.create(name).unwrap();
    el.ready().unwrap();
    el
}

#[test]
fn text_binding_updates_only_its_node() {
    let registry = registry();
    let tallies = Rc::new(RefCell::new(0));
    let observed: Log = Rc::default();
    let (count, log) = (tallies.clone(), observed.clone());
    registry
        .define(
            ElementDefinition::new("x-greet")
                .property(PropertyDeclaration::new("name").value("World").observer("nameChanged"))
                .property(PropertyDeclaration::new("other").value(1))
                .method("tally", move |_, args| {
                    *count.borrow_mut() += 1;
                    Ok(args[0].clone())
                })
                .method("nameChanged", move |_, args| {
                    log.borrow_mut().push(Value::array(args.to_vec()));
                    Ok(Value::Undefined)
                })
                .template_markup("<p>Hello [[name]]!</p><span>[[tally(other)]]</span>")
                .unwrap(),
        )
        .unwrap();
    let el = ready(&registry, "x-greet");
    insta::assert_snapshot!(el.to_html(), @"<p>Hello World!</p><span>1</span>");
    assert_eq!(*tallies.borrow(), 1);

    el.set_property("name", "Moon").unwrap();
    insta::assert_snapshot!(el.to_html(), @"<p>Hello Moon!</p><span>1</span>");
    assert_eq!(*tallies.borrow(), 1);

    let observed = observed.borrow();
    let last = observed.last().unwrap();
    assert_eq!(last.get_key("0"), Value::from("Moon"));
    assert_eq!(last.get_key("1"), Value::from("World"));
}

#[test]
fn attribute_and_property_bindings() {
    let registry = registry();
    registry
        .define(
            ElementDefinition::new("x-card")
                .property(PropertyDeclaration::new("kind").value("big"))
                .property(PropertyDeclaration::new("title").value("T"))
                .property(PropertyDeclaration::new("link").value("/home"))
                .template_markup(
                    r#"<div id="box" class$="card [[kind]]" title="[[title]]"></div><a id="lnk" href$="[[link]]"></a>"#,
                )
                .unwrap(),
        )
        .unwrap();
    let el = ready(&registry, "x-card");
    let root = el.root().unwrap();
    let boxed = el.by_id("box").unwrap();
    let link = el.by_id("lnk").unwrap();

    assert_eq!(root.attribute(boxed, "class").as_deref(), Some("card big"));
    assert_eq!(root.property(boxed, "title"), Value::from("T"));
    assert_eq!(root.attribute(boxed, "title"), None);
    assert_eq!(root.attribute(link, "href").as_deref(), Some("/home"));

    el.set_property("kind", "small").unwrap();
    assert_eq!(root.attribute(boxed, "class").as_deref(), Some("card small"));

    el.set_property("link", Value::Null).unwrap();
    assert_eq!(root.attribute(link, "href"), None);
}

#[test]
fn two_way_binding_with_custom_event() {
    let registry = registry();
    registry
        .define(
            ElementDefinition::new("x-search")
                .property(PropertyDeclaration::new("query").value("a"))
                .template_markup(r#"<input id="field" value="{{query::input}}">"#)
                .unwrap(),
        )
        .unwrap();
    let el = ready(&registry, "x-search");
    let root = el.root().unwrap();
    let field = el.by_id("field").unwrap();
    assert_eq!(root.property(field, "value"), Value::from("a"));

    root.set_property(field, "value", Value::from("abc"));
    root.dispatch_event(field, &Event::new("input")).unwrap();
    assert_eq!(el.get("query"), Value::from("abc"));

    el.set_property("query", Value::Null).unwrap();
    assert_eq!(root.property(field, "value"), Value::from(""));
}

#[test]
fn event_listeners_call_host_methods() {
    let registry = registry();
    let calls: Log = Rc::default();
    let log = calls.clone();
    registry
        .define(
            ElementDefinition::new("x-button")
                .method("handleClick", move |_, args| {
                    log.borrow_mut().extend(args.iter().cloned());
                    Ok(Value::Undefined)
                })
                .template_markup(r#"<button id="go" on-click="handleClick">Go</button>"#)
                .unwrap(),
        )
        .unwrap();
    let el = ready(&registry, "x-button");
    insta::assert_snapshot!(el.to_html(), @r#"<button id="go">Go</button>"#);

    let go = el.by_id("go").unwrap();
    el.root()
        .unwrap()
        .dispatch_event(go, &Event::with_value("click", 3))
        .unwrap();
    assert_eq!(*calls.borrow(), [Value::from("click"), Value::from(3)]);
}

#[test]
fn static_method_bindings_apply_at_stamp() {
    let registry = registry();
    registry
        .define(
            ElementDefinition::new("x-static")
                .method("greet", |_, args| {
                    Ok(Value::from(format!("{}!", args[0])))
                })
                .template_markup("<span>[[greet('hi')]]</span>")
                .unwrap(),
        )
        .unwrap();
    let el = ready(&registry, "x-static");
    insta::assert_snapshot!(el.to_html(), @"<span>hi!</span>");
}

fn define_child(registry: &Registry) {
    registry
        .define(ElementDefinition::new("x-child").property(PropertyDeclaration::new("count").notify()))
        .unwrap();
}

#[test]
fn clients_receive_and_send_values() {
    let registry = registry();
    define_child(&registry);
    registry
        .define(
            ElementDefinition::new("x-parent")
                .property(PropertyDeclaration::new("total").value(1))
                .template_markup(r#"<x-child id="c" count="{{total}}"></x-child>"#)
                .unwrap(),
        )
        .unwrap();
    let parent = ready(&registry, "x-parent");
    let root = parent.root().unwrap();
    let child = root.client(parent.by_id("c").unwrap()).unwrap();

    assert!(child.is_enabled());
    assert!(child.host().unwrap().ptr_eq(&parent));
    assert_eq!(child.get("count"), Value::from(1));
    assert_eq!(child.attribute("id").as_deref(), Some("c"));

    // Down: host property to client accessor.
    parent.set_property("total", 7).unwrap();
    assert_eq!(child.get("count"), Value::from(7));

    // Up: client notification back into the host.
    child.set_property("count", 5).unwrap();
    assert_eq!(parent.get("total"), Value::from(5));
    assert_eq!(registry.telemetry().instance_count, 2);
}

#[test]
fn sub_path_changes_are_forwarded_to_clients() {
    let registry = registry();
    let paths: Log = Rc::default();
    let log = paths.clone();
    registry
        .define(
            ElementDefinition::new("x-profile")
                .property(PropertyDeclaration::new("user"))
                .observer("userChanged(user.*)")
                .method("userChanged", move |_, args| {
                    log.borrow_mut().push(args[0].get_key("path"));
                    Ok(Value::Undefined)
                }),
        )
        .unwrap();
    registry
        .define(
            ElementDefinition::new("x-page")
                .property(
                    PropertyDeclaration::new("profile")
                        .value_with(|| Value::object_from([("name", Value::from("Ann"))])),
                )
                .template_markup(r#"<x-profile id="p" user="{{profile}}"></x-profile>"#)
                .unwrap(),
        )
        .unwrap();
    let page = ready(&registry, "x-page");
    let client = page.root().unwrap().client(page.by_id("p").unwrap()).unwrap();

    page.set("profile.name", "Zed").unwrap();
    assert_eq!(client.get("user.name"), Value::from("Zed"));
    assert_eq!(*paths.borrow(), [Value::from("user"), Value::from("user.name")]);
}

#[test]
fn stamped_templates_join_the_chain() {
    let registry = registry();
    registry
        .define(
            ElementDefinition::new("x-host")
                .property(PropertyDeclaration::new("name").value("World"))
                .template_markup(r#"<b>[[name]]</b><template id="t"><i>[[name]]</i></template>"#)
                .unwrap(),
        )
        .unwrap();
    let el = ready(&registry, "x-host");
    let root = el.root().unwrap();

    let nested = el
        .stamp_nested_template(&root, el.by_id("t").unwrap())
        .unwrap()
        .unwrap();
    insta::assert_snapshot!(nested.to_html(), @"<i>World</i>");
    assert_eq!(el.bound_templates().len(), 2);

    let mut extra = tempera_armature::parse_template_markup("<u>[[name]]</u>").unwrap();
    let bound = el.stamp_template(&mut extra).unwrap();
    insta::assert_snapshot!(bound.to_html(), @"<u>World</u>");

    el.set_property("name", "Sun").unwrap();
    insta::assert_snapshot!(nested.to_html(), @"<i>Sun</i>");
    insta::assert_snapshot!(bound.to_html(), @"<u>Sun</u>");

    assert!(matches!(el.attach_dom(bound.clone()), Err(EngineError::AlreadyAttached)));
    assert!(el.to_html().starts_with("<b>Sun</b>"));

    assert!(el.remove_bound_dom(&bound));
    assert!(!el.remove_bound_dom(&bound));
    assert_eq!(bound.to_html(), "");
    el.set_property("name", "Moon").unwrap();
    assert_eq!(el.bound_templates().len(), 2);
}

#[test]
fn ready_fails_cleanly_when_dom_is_already_attached() {
    let registry = registry();
    registry
        .define(
            ElementDefinition::new("x-early")
                .property(PropertyDeclaration::new("name").value("World"))
                .template_markup("<b>[[name]]</b>")
                .unwrap(),
        )
        .unwrap();
    let el = registry.create("x-early").unwrap();

    let mut extra = tempera_armature::parse_template_markup("<u>[[name]]</u>").unwrap();
    let early = el.stamp_template(&mut extra).unwrap();
    el.attach_dom(early.clone()).unwrap();

    assert!(matches!(el.ready(), Err(EngineError::AlreadyAttached)));
    assert!(!el.is_enabled());
    assert_eq!(el.flush_state(), FlushState::Uninitialized);
    assert!(el.has_pending());
    assert!(matches!(el.ready(), Err(EngineError::AlreadyAttached)));

    assert!(el.remove_bound_dom(&early));
    el.ready().unwrap();
    assert!(el.is_enabled());
    assert!(!el.has_pending());
    insta::assert_snapshot!(el.to_html(), @"<b>World</b>");

    el.set_property("name", "Moon").unwrap();
    insta::assert_snapshot!(el.to_html(), @"<b>Moon</b>");
}

#[test]
fn non_template_nodes_stamp_nothing() {
    let registry = registry();
    registry
        .define(
            ElementDefinition::new("x-plain-host")
                .template_markup(r#"<p id="x">plain</p>"#)
                .unwrap(),
        )
        .unwrap();
    let el = ready(&registry, "x-plain-host");
    let root = el.root().unwrap();
    assert!(el
        .stamp_nested_template(&root, el.by_id("x").unwrap())
        .unwrap()
        .is_none());
}
