//! Typed field extraction from parsed markup.
//!
//! Each extractor takes the document root and returns the payload of one
//! record variant. Missing elements and unparsable numbers become defaults.

use std::str::FromStr;

use crate::{
    markup::MarkupNode,
    record::{
        CardMessage, EmojiMessage, FileMessage, FileNoticeMessage, FinderMessage,
        FriendRequestMessage, GroupInviteMessage, GroupTodo, ImageMessage, LinkMessage,
        LocationMessage, MiniAppMessage, QuotedMessage, RedPacketMessage, TransferMessage,
        VideoMessage, VoiceMessage,
    },
};

/// Nested `appmsg/type` discriminants of app messages.
pub mod app_type {
    pub const LINK: i64 = 5;
    pub const FILE: i64 = 6;
    pub const MINIAPP: i64 = 33;
    pub const MINIAPP_SHARE: i64 = 36;
    pub const FINDER: i64 = 51;
    pub const QUOTE: i64 = 57;
    pub const FILE_NOTICE: i64 = 74;
    pub const TRANSFER: i64 = 2000;
    pub const RED_PACKET: i64 = 2001;
}

/// Markers that identify a shared link as a group invitation.
const INVITE_URL_MARKER: &str = "addchatroombyinvite";
const INVITE_TEXT_MARKER: &str = "邀请你加入群聊";

fn num<T: FromStr + Default>(raw: &str) -> T {
    raw.trim().parse().unwrap_or_default()
}

fn owned(raw: &str) -> String {
    raw.trim().to_string()
}

/// First non-empty value among `candidates`.
fn first_of<'a>(candidates: &[&'a str]) -> &'a str {
    candidates
        .iter()
        .copied()
        .find(|s| !s.trim().is_empty())
        .unwrap_or("")
}

// ── Media ───────────────────────────────────────────────────────────────────

pub fn image(root: &MarkupNode) -> ImageMessage {
    let attr = |key| root.attr_at("img", key);
    ImageMessage {
        aes_key: owned(attr("aeskey")),
        cdn_url: owned(first_of(&[
            attr("cdnmidimgurl"),
            attr("cdnbigimgurl"),
            attr("cdnthumburl"),
        ])),
        md5: owned(attr("md5")),
        length: num(first_of(&[attr("length"), attr("hdlength")])),
        download_url: None,
    }
}

pub fn voice(root: &MarkupNode) -> VoiceMessage {
    let attr = |key| root.attr_at("voicemsg", key);
    VoiceMessage {
        duration_ms: num(attr("voicelength")),
        aes_key: owned(attr("aeskey")),
        voice_url: owned(attr("voiceurl")),
        length: num(attr("length")),
        download_url: None,
    }
}

pub fn video(root: &MarkupNode) -> VideoMessage {
    let attr = |key| root.attr_at("videomsg", key);
    VideoMessage {
        duration_secs: num(attr("playlength")),
        aes_key: owned(attr("aeskey")),
        cdn_url: owned(attr("cdnvideourl")),
        md5: owned(attr("md5")),
        length: num(attr("length")),
        download_url: None,
    }
}

pub fn emoji(root: &MarkupNode) -> EmojiMessage {
    let attr = |key| root.attr_at("emoji", key);
    EmojiMessage {
        md5: owned(attr("md5")),
        cdn_url: owned(attr("cdnurl")),
        length: num(attr("len")),
        width: num(attr("width")),
        height: num(attr("height")),
    }
}

pub fn location(root: &MarkupNode) -> LocationMessage {
    let attr = |key| root.attr_at("location", key);
    LocationMessage {
        latitude: num(attr("x")),
        longitude: num(attr("y")),
        label: owned(attr("label")),
        poi_name: owned(attr("poiname")),
        scale: num(attr("scale")),
    }
}

// ── Contacts ────────────────────────────────────────────────────────────────

/// Shared contact card; the fields sit on the root element itself.
pub fn card(root: &MarkupNode) -> CardMessage {
    let attr = |key| root.attr(key).unwrap_or("");
    CardMessage {
        user_name: owned(attr("username")),
        nickname: owned(attr("nickname")),
        alias: owned(attr("alias")),
        avatar_url: owned(first_of(&[attr("bigheadimgurl"), attr("smallheadimgurl")])),
        province: owned(attr("province")),
        city: owned(attr("city")),
        signature: owned(attr("sign")),
        is_official: num::<i64>(attr("certflag")) != 0,
    }
}

pub fn friend_request(root: &MarkupNode) -> FriendRequestMessage {
    let attr = |key| root.attr(key).unwrap_or("");
    FriendRequestMessage {
        from_user: owned(attr("fromusername")),
        nickname: owned(attr("fromnickname")),
        greeting: owned(attr("content")),
        v3: owned(attr("encryptusername")),
        v4: owned(attr("ticket")),
        scene: num(attr("scene")),
        avatar_url: owned(first_of(&[attr("bigheadimgurl"), attr("smallheadimgurl")])),
    }
}

// ── App messages ────────────────────────────────────────────────────────────

/// The nested `appmsg/type` of an app message.
pub fn app_type(root: &MarkupNode) -> Option<i64> {
    root.int_at("appmsg/type")
}

/// Display text of an app message (`appmsg/title`).
pub fn app_title(root: &MarkupNode) -> String {
    owned(root.text_at("appmsg/title"))
}

pub fn link(root: &MarkupNode) -> LinkMessage {
    LinkMessage {
        title: app_title(root),
        description: owned(root.text_at("appmsg/des")),
        url: owned(root.text_at("appmsg/url")),
        thumb_url: owned(root.text_at("appmsg/thumburl")),
        source_name: owned(first_of(&[
            root.text_at("appmsg/sourcedisplayname"),
            root.text_at("appinfo/appname"),
        ])),
    }
}

/// Whether the shared link is an invitation to join a group.
#[must_use]
pub fn is_group_invite(root: &MarkupNode) -> bool {
    root.text_at("appmsg/url").contains(INVITE_URL_MARKER)
        || root.text_at("appmsg/title").contains(INVITE_TEXT_MARKER)
        || root.text_at("appmsg/des").contains(INVITE_TEXT_MARKER)
}

pub fn group_invite(root: &MarkupNode) -> GroupInviteMessage {
    let link = link(root);
    GroupInviteMessage {
        title: link.title,
        description: link.description,
        url: link.url,
        thumb_url: link.thumb_url,
    }
}

pub fn miniapp(root: &MarkupNode) -> MiniAppMessage {
    MiniAppMessage {
        title: app_title(root),
        app_id: owned(root.text_at("appmsg/weappinfo/appid")),
        page_path: owned(root.text_at("appmsg/weappinfo/pagepath")),
        source_username: owned(first_of(&[
            root.text_at("appmsg/weappinfo/username"),
            root.text_at("appmsg/sourceusername"),
        ])),
        source_name: owned(root.text_at("appmsg/sourcedisplayname")),
        icon_url: owned(root.text_at("appmsg/weappinfo/weappiconurl")),
    }
}

pub fn file(root: &MarkupNode) -> FileMessage {
    let notice = file_notice(root);
    FileMessage {
        file_name: notice.file_name,
        file_size: notice.file_size,
        file_ext: notice.file_ext,
        attachment_id: owned(root.text_at("appmsg/appattach/attachid")),
        encryption_key: owned(first_of(&[
            root.text_at("appmsg/appattach/aeskey"),
            root.text_at("appmsg/appattach/cdnattachurl"),
        ])),
        md5: owned(root.text_at("appmsg/md5")),
        download_url: None,
    }
}

pub fn file_notice(root: &MarkupNode) -> FileNoticeMessage {
    FileNoticeMessage {
        file_name: app_title(root),
        file_size: num(root.text_at("appmsg/appattach/totallen")),
        file_ext: owned(root.text_at("appmsg/appattach/fileext")),
    }
}

/// The message a reply quotes (`appmsg/refermsg`).
pub fn quoted(root: &MarkupNode) -> QuotedMessage {
    let refer = |field: &str| owned(root.text_at(&format!("appmsg/refermsg/{field}")));
    QuotedMessage {
        msg_type: root.int_at("appmsg/refermsg/type"),
        svr_id: refer("svrid"),
        from_id: refer("fromusr"),
        chat_id: refer("chatusr"),
        display_name: refer("displayname"),
        content: refer("content"),
    }
}

pub fn transfer(root: &MarkupNode) -> TransferMessage {
    let pay = |field: &str| owned(root.text_at(&format!("appmsg/wcpayinfo/{field}")));
    // The gateway misspells the transaction id element.
    let transaction_id = match pay("transcationid") {
        id if id.is_empty() => pay("transactionid"),
        id => id,
    };
    TransferMessage {
        fee_desc: pay("feedesc"),
        transfer_id: pay("transferid"),
        transaction_id,
        pay_subtype: num(&pay("paysubtype")),
        memo: pay("pay_memo"),
        payer: pay("payer_username"),
        receiver: pay("receiver_username"),
    }
}

pub fn red_packet(root: &MarkupNode) -> RedPacketMessage {
    let pay = |field: &str| owned(root.text_at(&format!("appmsg/wcpayinfo/{field}")));
    RedPacketMessage {
        title: pay("sendertitle"),
        scene_text: pay("scenetext"),
        native_url: pay("nativeurl"),
        pay_msg_id: pay("paymsgid"),
        inner_type: num(&pay("innertype")),
    }
}

pub fn finder(root: &MarkupNode) -> FinderMessage {
    let feed = |field: &str| owned(root.text_at(&format!("appmsg/finderFeed/{field}")));
    FinderMessage {
        object_id: feed("objectId"),
        nonce_id: feed("objectNonceId"),
        nickname: feed("nickname"),
        username: feed("username"),
        avatar_url: feed("avatar"),
        description: feed("desc"),
        media_count: num(&feed("mediaCount")),
        thumb_url: feed("mediaList/media/thumbUrl"),
    }
}

// ── System messages ─────────────────────────────────────────────────────────

/// `type` attribute of a `<sysmsg>` document.
pub fn sysmsg_type(root: &MarkupNode) -> Option<&str> {
    (root.name == "sysmsg")
        .then(|| root.attr("type"))
        .flatten()
}

/// Whether a `roomtoolstips` system message carries a group to-do.
#[must_use]
pub fn has_group_todo(root: &MarkupNode) -> bool {
    sysmsg_type(root) == Some("roomtoolstips") && root.find("roomtoolstips/todo").is_some()
}

pub fn group_todo(root: &MarkupNode) -> GroupTodo {
    let todo = |field: &str| owned(root.text_at(&format!("roomtoolstips/todo/{field}")));
    GroupTodo {
        todo_id: todo("todoid"),
        title: todo("title"),
        creator: todo("creator"),
        operator: todo("username"),
        op: num(&todo("op")),
        related_msg_id: todo("related_msgid"),
    }
}

/// Human-readable text of a structured system message: the replacement text
/// of a recall, the rendered template of a pat or templated notice.
pub fn sysmsg_text(root: &MarkupNode) -> Option<String> {
    let text = match sysmsg_type(root)? {
        "revokemsg" => owned(root.text_at("revokemsg/replacemsg")),
        "pat" => owned(root.text_at("pat/template")),
        "sysmsgtemplate" => render_template(root),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Render a `sysmsgtemplate` by substituting each `$name$` placeholder with
/// the nicknames listed under the matching `link` element.
pub fn render_template(root: &MarkupNode) -> String {
    let Some(tpl) = root.find("sysmsgtemplate/content_template") else {
        return String::new();
    };
    let mut text = tpl.text_at("template").to_string();
    if let Some(links) = tpl.child("link_list") {
        for link in links.children_named("link") {
            let Some(name) = link.attr("name") else {
                continue;
            };
            let value = link_nicknames(link).join("、");
            text = text.replace(&format!("${name}$"), &value);
        }
    }
    text
}

/// Nickname of the first member named by the template link `username`, the
/// account that sent the invitation.
pub fn template_inviter(root: &MarkupNode) -> Option<String> {
    let links = root.find("sysmsgtemplate/content_template/link_list")?;
    links
        .children_named("link")
        .find(|l| l.attr("name") == Some("username"))
        .and_then(|l| link_nicknames(l).into_iter().next())
}

fn link_nicknames(link: &MarkupNode) -> Vec<String> {
    link.find("memberlist")
        .map(|list| {
            list.children_named("member")
                .map(|m| owned(m.text_at("nickname")))
                .filter(|n| !n.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

// ── Message source ──────────────────────────────────────────────────────────

/// Ids in `<msgsource><atuserlist>`, comma separated.
pub fn at_list(msg_source: &str) -> Vec<String> {
    MarkupNode::parse(msg_source)
        .map(|root| {
            root.text_at("atuserlist")
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn parse(doc: &str) -> MarkupNode {
        MarkupNode::parse(doc).unwrap()
    }

    #[test]
    fn image_fields() {
        let root = parse(
            r#"<msg><img aeskey="abc" cdnmidimgurl="3057020100" md5="d41d" length="2048" hdlength="9000"/></msg>"#,
        );
        let img = image(&root);
        assert_eq!(img.aes_key, "abc");
        assert_eq!(img.cdn_url, "3057020100");
        assert_eq!(img.length, 2048);
        assert_eq!(img.download_url, None);
    }

    #[test]
    fn voice_and_video_fields() {
        let root = parse(r#"<msg><voicemsg voicelength="3120" length="5000" aeskey="k"/></msg>"#);
        let v = voice(&root);
        assert_eq!(v.duration_ms, 3120);
        assert_eq!(v.length, 5000);

        let root = parse(r#"<msg><videomsg playlength="12" length="800" md5="m" cdnvideourl="c"/></msg>"#);
        let v = video(&root);
        assert_eq!(v.duration_secs, 12);
        assert_eq!(v.cdn_url, "c");
    }

    #[test]
    fn location_coordinates() {
        let root = parse(
            r#"<msg><location x="39.9042" y="116.4074" scale="15" label="Beijing" poiname="Tiananmen"/></msg>"#,
        );
        let loc = location(&root);
        assert!((loc.latitude - 39.9042).abs() < 1e-9);
        assert!((loc.longitude - 116.4074).abs() < 1e-9);
        assert_eq!(loc.label, "Beijing");
        assert_eq!(loc.poi_name, "Tiananmen");
        assert_eq!(loc.scale, 15);
    }

    #[test]
    fn card_on_root_element() {
        let root = parse(
            r#"<msg username="gh_abc" nickname="News" certflag="24" province="GD" city="SZ" sign="daily"/>"#,
        );
        let c = card(&root);
        assert_eq!(c.user_name, "gh_abc");
        assert!(c.is_official);
        assert_eq!(c.signature, "daily");
    }

    #[test]
    fn friend_request_tickets() {
        let root = parse(
            r#"<msg fromusername="wxid_new" fromnickname="New" content="hi, I'm new" encryptusername="v3_x@stranger" ticket="v4_y@stranger" scene="30"/>"#,
        );
        let fr = friend_request(&root);
        assert_eq!(fr.from_user, "wxid_new");
        assert_eq!(fr.v3, "v3_x@stranger");
        assert_eq!(fr.v4, "v4_y@stranger");
        assert_eq!(fr.scene, 30);
    }

    #[test]
    fn file_attachment_fields() {
        let root = parse(
            r#"<msg><appmsg><title>report.pdf</title><type>6</type><md5>ff</md5>
               <appattach><totallen>10240</totallen><attachid>@cdn_1</attachid><aeskey>key1</aeskey><fileext>pdf</fileext></appattach>
               </appmsg></msg>"#,
        );
        assert_eq!(app_type(&root), Some(app_type::FILE));
        let f = file(&root);
        assert_eq!(f.file_name, "report.pdf");
        assert_eq!(f.file_size, 10240);
        assert_eq!(f.file_ext, "pdf");
        assert_eq!(f.attachment_id, "@cdn_1");
        assert_eq!(f.encryption_key, "key1");
        assert_eq!(f.md5, "ff");
    }

    #[test]
    fn quoted_message_fields() {
        let root = parse(
            r#"<msg><appmsg><title>agreed</title><type>57</type>
               <refermsg><type>1</type><svrid>555</svrid><fromusr>wxid_b</fromusr><chatusr>wxid_b</chatusr>
               <displayname>Bob</displayname><content>lunch at noon?</content></refermsg>
               </appmsg></msg>"#,
        );
        let q = quoted(&root);
        assert_eq!(app_title(&root), "agreed");
        assert_eq!(q.msg_type, Some(1));
        assert_eq!(q.svr_id, "555");
        assert_eq!(q.display_name, "Bob");
        assert_eq!(q.content, "lunch at noon?");
    }

    #[test]
    fn transfer_uses_gateway_spelling() {
        let root = parse(
            r#"<msg><appmsg><type>2000</type><wcpayinfo><paysubtype>1</paysubtype><feedesc>￥0.01</feedesc>
               <transcationid>tx1</transcationid><transferid>tr1</transferid><pay_memo>rent</pay_memo>
               <payer_username>wxid_p</payer_username><receiver_username>wxid_r</receiver_username></wcpayinfo></appmsg></msg>"#,
        );
        let t = transfer(&root);
        assert_eq!(t.fee_desc, "￥0.01");
        assert_eq!(t.transaction_id, "tx1");
        assert_eq!(t.pay_subtype, 1);
        assert_eq!(t.memo, "rent");
    }

    #[test]
    fn group_invite_markers() {
        let root = parse(
            r#"<msg><appmsg><title>邀请你加入群聊</title><des>"Ann"邀请你加入群聊"Book club"</des><type>5</type>
               <url>https://support.weixin.qq.com/cgi-bin/mmsupport-bin/addchatroombyinvite?ticket=x</url></appmsg></msg>"#,
        );
        assert!(is_group_invite(&root));
        let plain = parse(r#"<msg><appmsg><title>Docs</title><type>5</type><url>https://docs.rs</url></appmsg></msg>"#);
        assert!(!is_group_invite(&plain));
        assert_eq!(link(&plain).url, "https://docs.rs");
    }

    #[test]
    fn finder_feed() {
        let root = parse(
            r#"<msg><appmsg><type>51</type><finderFeed><objectId>14</objectId><objectNonceId>n</objectNonceId>
               <nickname>Chef</nickname><mediaCount>2</mediaCount><mediaList><media><thumbUrl>http://t</thumbUrl></media></mediaList>
               </finderFeed></appmsg></msg>"#,
        );
        let f = finder(&root);
        assert_eq!(f.object_id, "14");
        assert_eq!(f.media_count, 2);
        assert_eq!(f.thumb_url, "http://t");
    }

    #[test]
    fn sysmsg_texts() {
        let revoke = parse(
            r#"<sysmsg type="revokemsg"><revokemsg><replacemsg><![CDATA["Bob" recalled a message]]></replacemsg></revokemsg></sysmsg>"#,
        );
        assert_eq!(sysmsg_type(&revoke), Some("revokemsg"));
        assert_eq!(sysmsg_text(&revoke).unwrap(), "\"Bob\" recalled a message");

        let other = parse(r#"<sysmsg type="editrevokecontent"><x/></sysmsg>"#);
        assert_eq!(sysmsg_text(&other), None);

        let not_sysmsg = parse(r#"<msg type="pat"/>"#);
        assert_eq!(sysmsg_type(&not_sysmsg), None);
    }

    #[test]
    fn template_rendering() {
        let root = parse(
            r#"<sysmsg type="sysmsgtemplate"><sysmsgtemplate><content_template type="tmpl_type_profile">
               <plain><![CDATA[]]></plain>
               <template><![CDATA["$username$"邀请你加入了群聊，群聊参与人还有：$others$]]></template>
               <link_list>
                 <link name="username" type="link_profile"><memberlist><member><username>wxid_inv</username><nickname>Ann</nickname></member></memberlist></link>
                 <link name="others" type="link_profile"><memberlist>
                   <member><nickname>Bo</nickname></member><member><nickname>Cy</nickname></member>
                 </memberlist></link>
               </link_list></content_template></sysmsgtemplate></sysmsg>"#,
        );
        assert_eq!(render_template(&root), "\"Ann\"邀请你加入了群聊，群聊参与人还有：Bo、Cy");
        assert_eq!(template_inviter(&root).as_deref(), Some("Ann"));
    }

    #[test]
    fn group_todo_fields() {
        let root = parse(
            r#"<sysmsg type="roomtoolstips"><roomtoolstips><todo><op>0</op><todoid>t1</todoid>
               <username>wxid_op</username><creator>wxid_c</creator><related_msgid>777</related_msgid>
               <title><![CDATA[Book venue]]></title></todo></roomtoolstips></sysmsg>"#,
        );
        assert!(has_group_todo(&root));
        let todo = group_todo(&root);
        assert_eq!(todo.todo_id, "t1");
        assert_eq!(todo.title, "Book venue");
        assert_eq!(todo.operator, "wxid_op");
        assert_eq!(todo.related_msg_id, "777");
    }

    #[test]
    fn at_list_from_msg_source() {
        let ids = at_list("<msgsource><atuserlist><![CDATA[wxid_a,wxid_me,]]></atuserlist></msgsource>");
        assert_eq!(ids, vec!["wxid_a".to_string(), "wxid_me".to_string()]);
        assert!(at_list("").is_empty());
        assert!(at_list("<msgsource/>").is_empty());
    }
}
